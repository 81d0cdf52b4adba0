// Library root
// -----------
// Republishes a random xkcd comic (image + alt text) to a VK group wall.
// The binary (`main.rs`) only parses flags, sets up logging and calls
// `pipeline::run`.
//
// Module responsibilities:
// - `config`: environment-backed settings, validated before any request.
// - `error`: the error taxonomy shared by every step.
// - `scratch`: the staged image file and its guaranteed removal.
// - `xkcd`: comic id selection, metadata fetch and image download.
// - `vk`: upload server, photo upload, save and wall post calls, including
//   the check for errors embedded in successful responses.
// - `pipeline`: wires the steps together and reports the outcome.
pub mod config;
pub mod error;
pub mod pipeline;
pub mod scratch;
pub mod vk;
pub mod xkcd;

pub use config::Config;
pub use error::{PosterError, Step};
pub use pipeline::{run, Published, RunOptions, RunOutcome};
