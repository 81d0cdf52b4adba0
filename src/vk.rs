// Social API client. Covers the four calls needed to publish a photo on a
// group wall: upload server lookup, binary upload, save, and wall post.
//
// The API reports domain errors inside HTTP 200 bodies, so every response
// goes through `ApiReply::into_result` after the transport status check.

use reqwest::blocking::{multipart, Client};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PosterError, Result, Step};
use crate::scratch::ScratchFile;
use crate::xkcd::image_mime;

/// Short-lived URL accepting a single photo upload.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UploadTarget {
    pub upload_url: String,
}

/// Opaque tokens the upload host returns for a transferred photo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedAsset {
    pub photo: String,
    pub server: String,
    pub hash: String,
}

/// Permanent handle of a saved photo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublishedMedia {
    pub media_id: i64,
    pub owner_id: i64,
}

impl PublishedMedia {
    /// Attachment reference understood by `wall.post`.
    pub fn attachment(&self) -> String {
        format!("photo{}_{}", self.owner_id, self.media_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct WallPost {
    pub post_id: i64,
}

/// Error shapes seen in API bodies: method endpoints send an object, the
/// upload host sometimes sends a bare string. Missing object fields still
/// count as an error report.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiError {
    Object {
        #[serde(default)]
        error_code: i64,
        #[serde(default)]
        error_msg: String,
    },
    Text(String),
}

impl ApiError {
    fn into_error(self, step: Step) -> PosterError {
        let (code, message) = match self {
            ApiError::Object {
                error_code,
                error_msg,
            } => (error_code, error_msg),
            ApiError::Text(message) => (0, message),
        };
        PosterError::Provider {
            step,
            code,
            message,
        }
    }
}

/// `{response: T}` or `{error: {...}}`.
#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    response: Option<T>,
    error: Option<ApiError>,
}

impl<T> ApiReply<T> {
    fn into_result(self, step: Step) -> Result<T> {
        if let Some(error) = self.error {
            return Err(error.into_error(step));
        }
        self.response.ok_or_else(|| PosterError::UnexpectedPayload {
            step,
            detail: "body has neither `response` nor `error`".into(),
        })
    }
}

/// Upload host reply; flat rather than wrapped in `response`.
#[derive(Debug, Deserialize)]
struct UploadReply {
    photo: Option<String>,
    server: Option<Scalar>,
    hash: Option<String>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(i64),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SavedPhoto {
    id: i64,
    owner_id: i64,
}

#[derive(Clone)]
pub struct VkClient {
    client: Client,
    api_url: String,
    access_token: String,
    group_id: u64,
    api_version: String,
}

impl VkClient {
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        access_token: impl Into<String>,
        group_id: u64,
        api_version: impl Into<String>,
    ) -> Self {
        VkClient {
            client,
            api_url: api_url.into(),
            access_token: access_token.into(),
            group_id,
            api_version: api_version.into(),
        }
    }

    /// `photos.getWallUploadServer` for the configured group.
    pub fn get_wall_upload_server(&self) -> Result<UploadTarget> {
        let params = [
            ("group_id", self.group_id.to_string()),
            ("access_token", self.access_token.clone()),
            ("v", self.api_version.clone()),
        ];
        let target: UploadTarget =
            self.call(Step::Resolve, Method::GET, "photos.getWallUploadServer", &params)?;
        info!(group_id = self.group_id, "resolved upload server");
        Ok(target)
    }

    /// Multipart upload of the scratch file to `target`, field `photo`.
    pub fn upload_photo(&self, target: &UploadTarget, scratch: &ScratchFile) -> Result<UploadedAsset> {
        let step = Step::Upload;
        let file = scratch.open()?;
        let file_name = scratch
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("comic.png")
            .to_string();
        let part = multipart::Part::reader(file)
            .file_name(file_name.clone())
            .mime_str(image_mime(&file_name))
            .map_err(PosterError::transport(step))?;
        let form = multipart::Form::new().part("photo", part);

        debug!(file = %file_name, "uploading photo");
        let body = self
            .client
            .post(&target.upload_url)
            .multipart(form)
            .send()
            .and_then(|res| res.error_for_status())
            .and_then(|res| res.bytes())
            .map_err(PosterError::transport(step))?;
        let reply: UploadReply = decode(step, &body)?;

        if let Some(error) = reply.error {
            return Err(error.into_error(step));
        }
        let photo = reply
            .photo
            .filter(|photo| !photo.is_empty() && photo != "[]")
            .ok_or_else(|| PosterError::UnexpectedPayload {
                step,
                detail: "upload reply has no photo".into(),
            })?;
        let (server, hash) = match (reply.server, reply.hash) {
            (Some(server), Some(hash)) => (server.into_string(), hash),
            _ => {
                return Err(PosterError::UnexpectedPayload {
                    step,
                    detail: "upload reply lacks `server` or `hash`".into(),
                })
            }
        };
        info!(server = %server, "photo uploaded");
        Ok(UploadedAsset {
            photo,
            server,
            hash,
        })
    }

    /// `photos.saveWallPhoto`: turn upload tokens into a permanent photo.
    pub fn save_wall_photo(&self, asset: &UploadedAsset) -> Result<PublishedMedia> {
        let params = [
            ("access_token", self.access_token.clone()),
            ("group_id", self.group_id.to_string()),
            ("v", self.api_version.clone()),
            ("photo", asset.photo.clone()),
            ("server", asset.server.clone()),
            ("hash", asset.hash.clone()),
        ];
        let saved: Vec<SavedPhoto> =
            self.call(Step::Save, Method::POST, "photos.saveWallPhoto", &params)?;
        let first = saved
            .into_iter()
            .next()
            .ok_or_else(|| PosterError::UnexpectedPayload {
                step: Step::Save,
                detail: "save returned no photos".into(),
            })?;
        let media = PublishedMedia {
            media_id: first.id,
            owner_id: first.owner_id,
        };
        info!(media_id = media.media_id, owner_id = media.owner_id, "photo saved");
        Ok(media)
    }

    /// `wall.post` on behalf of the group with `media` attached.
    pub fn post_on_wall(&self, media: &PublishedMedia, message: &str) -> Result<WallPost> {
        let params = [
            ("access_token", self.access_token.clone()),
            ("v", self.api_version.clone()),
            ("owner_id", format!("-{}", self.group_id)),
            ("from_group", "1".to_string()),
            ("attachments", media.attachment()),
            ("message", message.to_string()),
        ];
        let post: WallPost = self.call(Step::Post, Method::POST, "wall.post", &params)?;
        info!(post_id = post.post_id, "wall post published");
        Ok(post)
    }

    fn call<T>(&self, step: Step, method: Method, name: &str, params: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.api_url, name);
        debug!(method = name, "calling api method");
        let body = self
            .client
            .request(method, &url)
            .query(params)
            .send()
            .and_then(|res| res.error_for_status())
            .and_then(|res| res.bytes())
            .map_err(PosterError::transport(step))?;
        let reply: ApiReply<T> = decode(step, &body)?;
        reply.into_result(step)
    }
}

/// Body decoding is separate from the transport: a 2xx body of the wrong
/// shape is a payload problem, not an HTTP one.
fn decode<T: DeserializeOwned>(step: Step, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| PosterError::UnexpectedPayload {
        step,
        detail: format!("malformed body: {err}"),
    })
}
