//! Prompts command handler.

use clap::Args;
use ragent_core::{config::AppConfig, AppResult};
use ragent_prompt::{list_prompts, load_prompt};

/// List available prompts (built-ins and workspace overrides)
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Print the full definition of this prompt instead of the list
    #[arg(long)]
    pub show: Option<String>,
}

impl PromptsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if let Some(ref id) = self.show {
            let prompt = load_prompt(&config.workspace, id)?;
            println!("{} - {}", prompt.id, prompt.title);
            if let Some(system) = prompt.system {
                println!("\n[system]\n{}", system.trim_end());
            }
            println!("\n[template]\n{}", prompt.template.trim_end());
            return Ok(());
        }

        for id in list_prompts(&config.workspace)? {
            let overridden = config
                .ragent_dir()
                .join("prompts")
                .join(format!("{}.yml", id))
                .exists();
            if overridden {
                println!("{} (workspace)", id);
            } else {
                println!("{}", id);
            }
        }

        Ok(())
    }
}
