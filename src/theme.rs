use crate::errors::AppResult;
use crate::store::PersistentStore;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const THEME_KEY: &str = "shelf.theme.dark";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn from_dark(dark: bool) -> Self {
        if dark {
            Self::Dark
        } else {
            Self::Light
        }
    }

    pub fn is_dark(self) -> bool {
        self == Self::Dark
    }
}

/// Dark-mode flag persisted under its own key. The first load seeds it from
/// the system preference and writes it back.
pub struct ThemePreference {
    store: PersistentStore,
    dark: bool,
}

impl ThemePreference {
    pub fn load(store: PersistentStore, system_prefers_dark: bool) -> Self {
        let schema = json!({ "type": "boolean" });
        let loaded = store.load_value(THEME_KEY, Some(&schema), || system_prefers_dark);
        let seeded = !loaded.is_stored();
        let dark = loaded.into_inner();

        let preference = Self { store, dark };
        if seeded {
            if let Err(error) = preference.persist() {
                tracing::warn!(error = %error, "failed to seed theme preference");
            }
        }
        preference
    }

    pub fn theme(&self) -> Theme {
        Theme::from_dark(self.dark)
    }

    pub fn set(&mut self, theme: Theme) -> AppResult<Theme> {
        self.dark = theme.is_dark();
        self.persist()?;
        Ok(self.theme())
    }

    pub fn toggle(&mut self) -> AppResult<Theme> {
        self.set(Theme::from_dark(!self.dark))
    }

    fn persist(&self) -> AppResult<()> {
        self.store.save(THEME_KEY, &self.dark)
    }
}

/// Best-effort read of the terminal/desktop colour scheme.
///
/// `SHELF_COLOR_SCHEME=dark|light` wins; otherwise `COLORFGBG` ("fg;bg") is
/// read and a background colour index below 7 counts as dark.
pub fn system_prefers_dark() -> bool {
    if let Ok(scheme) = std::env::var("SHELF_COLOR_SCHEME") {
        return scheme.trim().eq_ignore_ascii_case("dark");
    }
    std::env::var("COLORFGBG")
        .ok()
        .as_deref()
        .and_then(parse_colorfgbg)
        .unwrap_or(false)
}

fn parse_colorfgbg(raw: &str) -> Option<bool> {
    let background = raw.rsplit(';').next()?.trim().parse::<u8>().ok()?;
    Some(background < 7 || background == 8)
}

#[cfg(test)]
mod tests {
    use super::{parse_colorfgbg, Theme, ThemePreference, THEME_KEY};
    use crate::store::{KeyValueStore, MemoryStore, PersistentStore};
    use std::sync::Arc;

    #[test]
    fn first_load_seeds_from_system_and_persists() {
        let backend = Arc::new(MemoryStore::new());
        let store = PersistentStore::new(backend.clone());
        let preference = ThemePreference::load(store.clone(), true);
        assert_eq!(preference.theme(), Theme::Dark);
        assert_eq!(backend.get(THEME_KEY).expect("get").as_deref(), Some("true"));

        let reloaded = ThemePreference::load(store, false);
        assert_eq!(reloaded.theme(), Theme::Dark);
    }

    #[test]
    fn toggle_persists_choice() {
        let store = PersistentStore::in_memory();
        let mut preference = ThemePreference::load(store.clone(), false);
        assert_eq!(preference.toggle().expect("toggle"), Theme::Dark);
        assert_eq!(ThemePreference::load(store, false).theme(), Theme::Dark);
    }

    #[test]
    fn corrupt_value_falls_back_to_system() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(THEME_KEY, "\"purple\"").expect("set");
        let preference = ThemePreference::load(PersistentStore::new(backend.clone()), true);
        assert_eq!(preference.theme(), Theme::Dark);
        assert_eq!(backend.get(THEME_KEY).expect("get").as_deref(), Some("true"));
    }

    #[test]
    fn colorfgbg_background_decides() {
        assert_eq!(parse_colorfgbg("15;0"), Some(true));
        assert_eq!(parse_colorfgbg("0;15"), Some(false));
        assert_eq!(parse_colorfgbg("garbage"), None);
    }
}
