// The run itself: Fetch -> Resolve -> Upload -> Save -> Post, each step fed
// by the previous one's output. The first error ends the run; the scratch
// guard created in the fetch step is dropped on every way out of `publish`.

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use tracing::info;

use crate::config::Config;
use crate::error::{PosterError, Result, Step};
use crate::scratch::ScratchFile;
use crate::vk::{PublishedMedia, UploadTarget, UploadedAsset, VkClient};
use crate::xkcd::{image_file_name, XkcdClient};

/// Summary of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Published {
    pub comic_id: u32,
    pub attachment: String,
    pub post_id: i64,
}

/// Terminal states of a run.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Published),
    Aborted(PosterError),
}

impl RunOutcome {
    pub fn into_result(self) -> Result<Published> {
        match self {
            RunOutcome::Completed(published) => Ok(published),
            RunOutcome::Aborted(err) => Err(err),
        }
    }
}

/// Per-run options that are not part of the environment configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Publish this comic instead of a random one.
    pub comic_id: Option<u32>,
    pub show_progress: bool,
}

/// Both API clients, sharing one HTTP client.
pub struct Clients {
    pub xkcd: XkcdClient,
    pub vk: VkClient,
}

impl Clients {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| PosterError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Clients {
            xkcd: XkcdClient::new(client.clone(), config.xkcd_api_url.clone()),
            vk: VkClient::new(
                client,
                config.vk_api_url.clone(),
                config.access_token.clone(),
                config.group_id,
                config.api_version.clone(),
            ),
        })
    }
}

/// Output of the fetch step: the caption plus the staged image.
pub struct FetchedComic {
    pub comic_id: u32,
    pub caption: String,
    pub scratch: ScratchFile,
}

/// Step 1: resolve the comic id, read its metadata and stage the image.
pub fn fetch_comic(config: &Config, xkcd: &XkcdClient, comic_id: Option<u32>) -> Result<FetchedComic> {
    let comic_id = match comic_id {
        Some(id) => id,
        None => xkcd.random_comic_id(config.max_comic_id)?,
    };
    let comic = xkcd.comic(comic_id)?;
    let scratch = ScratchFile::reserve(&config.scratch_dir, &image_file_name(&comic.image_url))?;
    xkcd.download_image(&comic, &scratch)?;
    Ok(FetchedComic {
        comic_id,
        caption: comic.caption,
        scratch,
    })
}

/// Step 2.
pub fn resolve_upload_target(vk: &VkClient) -> Result<UploadTarget> {
    vk.get_wall_upload_server()
}

/// Step 3.
pub fn upload_asset(vk: &VkClient, target: &UploadTarget, scratch: &ScratchFile) -> Result<UploadedAsset> {
    vk.upload_photo(target, scratch)
}

/// Step 4a.
pub fn save_asset(vk: &VkClient, asset: &UploadedAsset) -> Result<PublishedMedia> {
    vk.save_wall_photo(asset)
}

/// Step 4b.
pub fn post_media(vk: &VkClient, media: &PublishedMedia, caption: &str) -> Result<i64> {
    vk.post_on_wall(media, caption).map(|post| post.post_id)
}

/// Run the whole sequence once. Failures are not reported here; the caller
/// gets the error in `RunOutcome::Aborted`.
pub fn run(config: &Config, options: RunOptions) -> RunOutcome {
    let progress = Progress::new(options.show_progress);
    let outcome = Clients::from_config(config).and_then(|clients| publish(config, &clients, options, &progress));
    progress.clear();
    match outcome {
        Ok(published) => {
            info!(
                comic_id = published.comic_id,
                post_id = published.post_id,
                attachment = %published.attachment,
                "run completed"
            );
            RunOutcome::Completed(published)
        }
        Err(err) => RunOutcome::Aborted(err),
    }
}

/// The linear sequence over already-built clients. The scratch file lives
/// in `fetched` and is removed when this function returns.
pub fn publish(config: &Config, clients: &Clients, options: RunOptions, progress: &Progress) -> Result<Published> {
    progress.step(Step::Fetch, "Fetching comic...");
    let fetched = fetch_comic(config, &clients.xkcd, options.comic_id)?;
    info!(comic_id = fetched.comic_id, "comic staged");

    progress.step(Step::Resolve, "Requesting upload server...");
    let target = resolve_upload_target(&clients.vk)?;

    progress.step(Step::Upload, "Uploading image...");
    let asset = upload_asset(&clients.vk, &target, &fetched.scratch)?;

    progress.step(Step::Save, "Saving photo...");
    let media = save_asset(&clients.vk, &asset)?;

    progress.step(Step::Post, "Posting to wall...");
    let post_id = post_media(&clients.vk, &media, &fetched.caption)?;

    Ok(Published {
        comic_id: fetched.comic_id,
        attachment: media.attachment(),
        post_id,
    })
}

/// Spinner on stderr; hidden when disabled or when stderr is not a terminal.
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        let bar = if enabled {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner} {prefix:.dim} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Progress { bar }
    }

    fn step(&self, step: Step, message: &'static str) {
        self.bar.set_prefix(format!("[{step}]"));
        self.bar.set_message(message);
    }

    fn clear(&self) {
        self.bar.finish_and_clear();
    }
}
