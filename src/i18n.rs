// i18n.rs
//
// Runtime string tables for the viewer overlay.
// - Translations live in either:
//   A) assets/i18n/<lang>.json            { "key": "value" }
//   B) assets/i18n.json                   { "<lang>": { "key": "value" } }
//   searched next to the executable first, then in the working directory.
// - Missing keys fall back to the built-in English table, then to the key itself.
// - Placeholders: tr_with("status.fov", &[("fov", "75")]) fills "{fov}".

use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

const BUILTIN_EN: &[(&str, &str)] = &[
    ("app.title", "City Panorama"),
    ("panel.cities", "Cities"),
    ("panel.no_cities", "No panoramas found in {dir}"),
    ("overlay.loading", "Generating 3D environment..."),
    ("overlay.loading_detail", "Preparing panorama for {city}"),
    ("overlay.failed", "Failed to load 3D view. Please try again."),
    ("overlay.pick_city", "Pick a city to look around"),
    ("overlay.hint_drag", "Drag to look around"),
    ("overlay.hint_ambience", "Interactive ambience"),
    ("button.zoom_in", "Zoom in"),
    ("button.zoom_out", "Zoom out"),
    ("button.rotate_on", "Auto rotate"),
    ("button.rotate_off", "Pause rotation"),
    ("button.reset", "Reset view"),
    ("status.city", "City: {city}"),
    ("status.fov", "FOV: {fov}°"),
    ("status.lon", "Lon: {lon}°"),
    ("status.lat", "Lat: {lat}°"),
    ("status.fps", "FPS: {fps}"),
];

#[derive(Debug, Clone)]
pub struct I18n {
    lang: String,
    map: HashMap<String, String>,
    builtin: HashMap<String, String>,
}

impl I18n {
    fn new(lang: String, map: HashMap<String, String>) -> Self {
        let builtin = BUILTIN_EN
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { lang, map, builtin }
    }

    pub fn get(&self, key: &str) -> String {
        self.map
            .get(key)
            .or_else(|| self.builtin.get(key))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

static I18N: OnceCell<RwLock<I18n>> = OnceCell::new();

fn search_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(dir.join("assets"));
    }
    roots.push(PathBuf::from("assets"));
    roots
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("ignoring malformed translation file {}: {e}", path.display());
            None
        }
    }
}

fn load_lang(lang: &str) -> HashMap<String, String> {
    for root in search_roots() {
        let per_lang = root.join("i18n").join(format!("{lang}.json"));
        if let Some(map) = read_json::<HashMap<String, String>>(&per_lang) {
            return map;
        }

        let combined = root.join("i18n.json");
        if let Some(mut all) = read_json::<HashMap<String, HashMap<String, String>>>(&combined) {
            if let Some(map) = all.remove(lang) {
                return map;
            }
        }
    }

    if lang != "en" {
        log::debug!("no translations for '{lang}', using built-in English");
    }
    HashMap::new()
}

/// Installs the tables for `lang`. Later calls replace the current language.
pub fn init(lang: impl Into<String>) {
    let lang = lang.into();
    let map = load_lang(&lang);
    install(I18n::new(lang, map));
}

fn install(i: I18n) {
    if let Some(lock) = I18N.get() {
        if let Ok(mut w) = lock.write() {
            *w = i;
        }
    } else if let Err(rejected) = I18N.set(RwLock::new(i)) {
        // Another thread won the race; overwrite its tables with ours.
        if let (Some(lock), Ok(i)) = (I18N.get(), rejected.into_inner()) {
            if let Ok(mut w) = lock.write() {
                *w = i;
            }
        }
    }
}

/// Language of the installed tables, `en` before `init`.
pub fn current_lang() -> String {
    I18N.get()
        .and_then(|l| l.read().ok().map(|i| i.lang.clone()))
        .unwrap_or_else(|| "en".to_string())
}

/// Localized text for `key`. Works before `init`, using the built-in table.
pub fn tr(key: &str) -> String {
    match I18N.get().and_then(|l| l.read().ok()) {
        Some(i) => i.get(key),
        None => BUILTIN_EN
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .unwrap_or_else(|| key.to_string()),
    }
}

/// Localized text with `{name}` placeholders filled in. Unknown placeholders stay.
pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    fill(tr(key), args)
}

fn fill(mut s: String, args: &[(&str, String)]) -> String {
    for (k, v) in args {
        s = s.replace(&format!("{{{k}}}"), v);
    }
    s
}
