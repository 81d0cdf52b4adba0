// Comic provider client: resolves comic ids, reads the JSON metadata of a
// comic and downloads its image into the scratch file.

use rand::Rng;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PosterError, Result, Step};
use crate::scratch::ScratchFile;

/// Id the provider never serves.
const MISSING_COMIC_ID: u32 = 404;

/// Metadata of a single comic, as far as this crate cares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comic {
    pub id: u32,
    pub image_url: String,
    pub caption: String,
}

/// Raw `info.0.json` payload. Fields are optional so that an incomplete
/// payload is reported as a fetch error instead of a decode error.
#[derive(Deserialize, Debug)]
struct ComicInfo {
    num: Option<u32>,
    img: Option<String>,
    alt: Option<String>,
}

#[derive(Clone)]
pub struct XkcdClient {
    client: Client,
    base_url: String,
}

impl XkcdClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        XkcdClient {
            client,
            base_url: base_url.into(),
        }
    }

    /// Number of the newest published comic.
    pub fn latest_comic_id(&self) -> Result<u32> {
        let url = format!("{}/info.0.json", self.base_url);
        let info = self.get_info(&url, "latest comic")?;
        info.num
            .filter(|num| *num > 0)
            .ok_or_else(|| PosterError::fetch("latest comic metadata has no `num`"))
    }

    /// Pick a random comic id in `1..=max`. Without a configured bound the
    /// provider is asked for its newest comic.
    pub fn random_comic_id(&self, max: Option<u32>) -> Result<u32> {
        let max = match max {
            Some(max) => max,
            None => self.latest_comic_id()?,
        };
        let id = pick_comic_id(&mut rand::rng(), max);
        debug!(max, id, "picked random comic");
        Ok(id)
    }

    /// Fetch the metadata of comic `id`.
    pub fn comic(&self, id: u32) -> Result<Comic> {
        let url = format!("{}/{}/info.0.json", self.base_url, id);
        let info = self.get_info(&url, &format!("comic {id}"))?;
        let image_url = info
            .img
            .filter(|img| !img.is_empty())
            .ok_or_else(|| PosterError::fetch(format!("comic {id} metadata has no `img`")))?;
        let caption = info
            .alt
            .ok_or_else(|| PosterError::fetch(format!("comic {id} metadata has no `alt`")))?;
        info!(comic_id = id, image_url = %image_url, "fetched comic metadata");
        Ok(Comic {
            id,
            image_url,
            caption,
        })
    }

    /// Download the image of `comic` into `scratch`.
    pub fn download_image(&self, comic: &Comic, scratch: &ScratchFile) -> Result<()> {
        let res = self
            .client
            .get(&comic.image_url)
            .send()
            .map_err(PosterError::transport(Step::Fetch))?;
        if !res.status().is_success() {
            return Err(PosterError::fetch(format!(
                "image download for comic {} failed: {}",
                comic.id,
                res.status()
            )));
        }
        let bytes = res.bytes().map_err(PosterError::transport(Step::Fetch))?;
        scratch.write(&bytes)
    }

    fn get_info(&self, url: &str, what: &str) -> Result<ComicInfo> {
        debug!(url, "requesting comic metadata");
        let res = self
            .client
            .get(url)
            .send()
            .map_err(PosterError::transport(Step::Fetch))?;
        if !res.status().is_success() {
            return Err(PosterError::fetch(format!(
                "metadata request for {what} failed: {}",
                res.status()
            )));
        }
        res.json::<ComicInfo>()
            .map_err(|err| PosterError::fetch(format!("metadata for {what} is not valid JSON: {err}")))
    }
}

/// Uniform draw from `1..=max`, skipping the id the provider never serves.
pub fn pick_comic_id<R: Rng>(rng: &mut R, max: u32) -> u32 {
    if max < MISSING_COMIC_ID {
        return rng.random_range(1..=max.max(1));
    }
    let id = rng.random_range(1..max);
    if id >= MISSING_COMIC_ID {
        id + 1
    } else {
        id
    }
}

/// Local file name for the staged image, keeping the extension of `image_url`.
pub fn image_file_name(image_url: &str) -> String {
    format!("comic.{}", image_extension(image_url))
}

/// MIME type announced for the staged image in the multipart upload.
pub fn image_mime(file_name: &str) -> &'static str {
    match image_extension(file_name).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

fn image_extension(name: &str) -> String {
    let name = name.split(['?', '#']).next().unwrap_or(name);
    let last = name.rsplit('/').next().unwrap_or(name);
    match last.rsplit_once('.') {
        Some((_, ext)) if matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "gif") => {
            ext.to_ascii_lowercase()
        }
        _ => "png".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    fn client_for(server: &MockServer) -> XkcdClient {
        XkcdClient::new(Client::new(), server.base_url())
    }

    #[test]
    fn comic_metadata_is_parsed() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/353/info.0.json");
            then.status(200).json_body(json!({
                "num": 353,
                "img": "https://imgs.xkcd.com/comics/python.png",
                "alt": "I wrote 20 short programs in Python yesterday."
            }));
        });

        let comic = client_for(&server).comic(353).unwrap();
        mock.assert();
        assert_eq!(comic.id, 353);
        assert_eq!(comic.image_url, "https://imgs.xkcd.com/comics/python.png");
        assert_eq!(comic.caption, "I wrote 20 short programs in Python yesterday.");
    }

    #[test]
    fn same_id_yields_same_caption() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/221/info.0.json");
            then.status(200).json_body(json!({
                "num": 221,
                "img": "https://imgs.xkcd.com/comics/random_number.png",
                "alt": "RFC 1149.5 specifies 4 as the standard IEEE-vetted random number."
            }));
        });

        let client = client_for(&server);
        let first = client.comic(221).unwrap();
        let second = client.comic(221).unwrap();
        assert_eq!(first.caption, second.caption);
    }

    #[test]
    fn missing_fields_are_fetch_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/1/info.0.json");
            then.status(200).json_body(json!({ "num": 1, "alt": "no image here" }));
        });

        let err = client_for(&server).comic(1).unwrap_err();
        assert!(matches!(err, PosterError::Fetch { ref reason } if reason.contains("img")));
    }

    #[test]
    fn non_success_status_is_a_fetch_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/404/info.0.json");
            then.status(404);
        });

        let err = client_for(&server).comic(404).unwrap_err();
        assert!(matches!(err, PosterError::Fetch { ref reason } if reason.contains("404")));
    }

    #[test]
    fn image_is_downloaded_into_scratch() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/comics/python.png");
            then.status(200).body(b"\x89PNG fake");
        });
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::reserve(dir.path(), "comic.png").unwrap();
        let comic = Comic {
            id: 353,
            image_url: server.url("/comics/python.png"),
            caption: String::new(),
        };

        client_for(&server).download_image(&comic, &scratch).unwrap();
        assert_eq!(std::fs::read(scratch.path()).unwrap(), b"\x89PNG fake");
    }

    #[test]
    fn failed_download_is_a_fetch_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/comics/gone.png");
            then.status(500);
        });
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::reserve(dir.path(), "comic.png").unwrap();
        let comic = Comic {
            id: 1,
            image_url: server.url("/comics/gone.png"),
            caption: String::new(),
        };

        let err = client_for(&server).download_image(&comic, &scratch).unwrap_err();
        assert!(matches!(err, PosterError::Fetch { .. }));
        assert!(!scratch.path().exists());
    }

    #[test]
    fn latest_id_bounds_the_random_pick() {
        let server = MockServer::start();
        let latest = server.mock(|when, then| {
            when.method(GET).path("/info.0.json");
            then.status(200).json_body(json!({
                "num": 3,
                "img": "https://imgs.xkcd.com/comics/latest.png",
                "alt": "newest"
            }));
        });

        let id = client_for(&server).random_comic_id(None).unwrap();
        latest.assert();
        assert!((1..=3).contains(&id));
    }

    #[test]
    fn configured_bound_skips_the_lookup() {
        let server = MockServer::start();
        let latest = server.mock(|when, then| {
            when.method(GET).path("/info.0.json");
            then.status(200).json_body(json!({ "num": 3 }));
        });

        let id = client_for(&server).random_comic_id(Some(1)).unwrap();
        latest.assert_calls(0);
        assert_eq!(id, 1);
    }

    #[test]
    fn pick_never_returns_missing_id() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5_000 {
            let id = pick_comic_id(&mut rng, 405);
            assert!((1..=405).contains(&id));
            assert_ne!(id, MISSING_COMIC_ID);
        }
    }

    #[test]
    fn file_name_and_mime_follow_the_image_url() {
        assert_eq!(image_file_name("https://imgs.xkcd.com/comics/python.png"), "comic.png");
        assert_eq!(image_file_name("https://imgs.xkcd.com/comics/old.JPG"), "comic.jpg");
        assert_eq!(image_file_name("https://imgs.xkcd.com/comics/anim.gif?x=1"), "comic.gif");
        assert_eq!(image_file_name("https://imgs.xkcd.com/comics/noext"), "comic.png");
        assert_eq!(image_mime("comic.jpg"), "image/jpeg");
        assert_eq!(image_mime("comic.gif"), "image/gif");
        assert_eq!(image_mime("comic.png"), "image/png");
    }
}
