pub mod fakes;

mod pipeline;
mod scenarios;
