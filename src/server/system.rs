//! Debate-file listing and agenda lists for the front-end.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, PathBuf};

use super::{ApiError, ApiResult, AppState};
use crate::debate::ParticipantConfig;
use crate::error::ConfigError;

const LANGS: [&str; 2] = ["ja", "en"];

/// Per-language pair of values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ByLang<T> {
    pub ja: T,
    pub en: T,
}

impl<T> ByLang<T> {
    fn get_mut(&mut self, lang: &str) -> &mut T {
        if lang == "ja" {
            &mut self.ja
        } else {
            &mut self.en
        }
    }
}

/// One entry of `GET /system/config_list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigListing {
    pub id: usize,
    pub file: ByLang<String>,
    pub label: ByLang<String>,
    pub panelist_names: ByLang<Vec<String>>,
    pub panelist_images: ByLang<BTreeMap<String, String>>,
}

/// The parts of a debate file shown in the picker.
#[derive(Debug, Deserialize)]
struct DebatePreview {
    #[serde(default)]
    label: String,
    user: ParticipantConfig,
    panelists: Vec<ParticipantConfig>,
}

/// Join a client-supplied file name onto `dir`, refusing anything but a plain name.
pub(crate) fn config_file_path(dir: &std::path::Path, name: &str) -> ApiResult<PathBuf> {
    plain_file_name(name).map(|name| dir.join(name))
}

/// `name` if it is a single path component with no separators or dots-only parts.
pub(crate) fn plain_file_name(name: &str) -> ApiResult<&str> {
    let mut components = std::path::Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(ApiError::bad_request(format!("invalid file name: {}", name))),
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Scan `dir` for `<prefix>_ja.yml` files and describe each `ja`/`en` pair.
pub fn list_configs(dir: &std::path::Path) -> Result<Vec<ConfigListing>, ConfigError> {
    let mut prefixes: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix("_ja.yml"))
                .map(str::to_string)
        })
        .collect();
    prefixes.sort();

    let mut listings = Vec::with_capacity(prefixes.len());
    for (idx, prefix) in prefixes.iter().enumerate() {
        let mut listing = ConfigListing {
            id: idx + 1,
            file: ByLang {
                ja: format!("{}_ja.yml", prefix),
                en: format!("{}_en.yml", prefix),
            },
            label: ByLang::default(),
            panelist_names: ByLang::default(),
            panelist_images: ByLang::default(),
        };
        for lang in LANGS {
            let preview: DebatePreview = read_yaml(&dir.join(format!("{}_{}.yml", prefix, lang)))?;
            *listing.label.get_mut(lang) = preview.label;

            let names = listing.panelist_names.get_mut(lang);
            let images = listing.panelist_images.get_mut(lang);
            for person in std::iter::once(preview.user).chain(preview.panelists) {
                names.push(person.name.clone());
                images.insert(person.name, person.image);
            }
        }
        listings.push(listing);
    }
    Ok(listings)
}

/// GET /system/config_list
pub async fn config_list(State(state): State<AppState>) -> ApiResult<Json<Vec<ConfigListing>>> {
    let listings = list_configs(&state.config_dir).map_err(|e| {
        tracing::error!(dir = %state.config_dir.display(), error = %e, "Config listing failed");
        ApiError::from(e)
    })?;
    Ok(Json(listings))
}

/// GET /system/agenda/{agenda_file}
pub async fn agenda(
    State(state): State<AppState>,
    Path(agenda_file): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = config_file_path(&state.config_dir, &agenda_file)?;
    if !path.exists() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("agenda file not found. path={}", agenda_file),
        ));
    }
    Ok(Json(read_yaml(&path)?))
}
