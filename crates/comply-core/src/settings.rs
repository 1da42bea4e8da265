//! Settings store — assessor identity, cloud provider, theme.
//!
//! A single record (`default`) holds all settings. The store also owns
//! the [`SharedActor`] handle other stores use for attribution: whatever
//! assessor name is configured here is what lands in `updated_by` on
//! their next mutation, falling back to `"Unknown"` when unset.

use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use crate::error::{StoreError, ValidationError};
use crate::persist::PersistenceAdapter;
use crate::store::{ActorSource, RecordStore, StoreSchema, UNKNOWN_ACTOR};

/// Storage key owned by the settings store.
pub const SETTINGS_STORE_KEY: &str = "comply/settings";

/// ID of the singleton settings record.
pub const SETTINGS_RECORD_ID: &str = "default";

/// Cloud provider whose implementation guidance is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
    Other,
}

impl CloudProvider {
    /// The wire/storage form of the provider.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::Other => "other",
        }
    }

    /// Parse a stored provider string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "aws" => Some(Self::Aws),
            "azure" => Some(Self::Azure),
            "gcp" => Some(Self::Gcp),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// UI theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    /// The wire/storage form of the theme.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// Parse a stored theme string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }
}

/// Typed view of the settings record.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Name stamped into `updated_by` on mutations; empty when unset.
    pub assessor: String,
    pub provider: CloudProvider,
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            assessor: String::new(),
            provider: CloudProvider::Aws,
            theme: Theme::Light,
        }
    }
}

/// Attribution source backed by the configured assessor name.
///
/// Holds a synchronous cache so that stores can resolve the actor at
/// mutation time without an async dependency on the settings store.
#[derive(Debug, Default)]
pub struct SharedActor {
    name: RwLock<Option<String>>,
}

impl SharedActor {
    fn set(&self, name: Option<String>) {
        let mut guard = self.name.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = name.filter(|n| !n.trim().is_empty());
    }
}

impl ActorSource for SharedActor {
    fn current_actor(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| UNKNOWN_ACTOR.to_owned())
    }
}

/// Schema for the settings store.
#[derive(Debug, Clone, Copy)]
pub struct SettingsSchema;

impl StoreSchema for SettingsSchema {
    fn store_key(&self) -> &'static str {
        SETTINGS_STORE_KEY
    }

    fn defaults(&self, _id: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("assessor".to_owned(), Value::String(String::new()));
        fields.insert(
            "provider".to_owned(),
            Value::String(CloudProvider::Aws.as_str().to_owned()),
        );
        fields.insert(
            "theme".to_owned(),
            Value::String(Theme::Light.as_str().to_owned()),
        );
        fields
    }

    fn validate_field(&self, field: &str, value: &Value) -> Result<(), ValidationError> {
        fn expect_str<'a>(field: &str, value: &'a Value) -> Result<&'a str, ValidationError> {
            value.as_str().ok_or_else(|| ValidationError::InvalidValue {
                field: field.to_owned(),
                reason: "must be a string".to_owned(),
            })
        }
        match field {
            "provider" => {
                let s = expect_str(field, value)?;
                if CloudProvider::parse(s).is_none() {
                    return Err(ValidationError::InvalidValue {
                        field: field.to_owned(),
                        reason: format!("unknown provider '{s}' (expected aws, azure, gcp, or other)"),
                    });
                }
                Ok(())
            }
            "theme" => {
                let s = expect_str(field, value)?;
                if Theme::parse(s).is_none() {
                    return Err(ValidationError::InvalidValue {
                        field: field.to_owned(),
                        reason: format!("unknown theme '{s}' (expected light or dark)"),
                    });
                }
                Ok(())
            }
            "assessor" => expect_str(field, value).map(|_| ()),
            _ => Ok(()),
        }
    }
}

/// Typed facade over the settings record store.
pub struct SettingsStore {
    inner: RecordStore<SettingsSchema>,
    actor: Arc<SharedActor>,
}

impl SettingsStore {
    /// Create the settings store and prime the shared actor cache from the
    /// persisted assessor name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn open(adapter: PersistenceAdapter) -> Result<Self, StoreError> {
        let actor = Arc::new(SharedActor::default());
        let inner = RecordStore::new(
            adapter,
            SettingsSchema,
            Arc::clone(&actor) as Arc<dyn ActorSource>,
        );
        let store = Self { inner, actor };
        store.refresh_actor().await?;
        Ok(store)
    }

    /// The attribution handle other stores are constructed with.
    #[must_use]
    pub fn actor_handle(&self) -> Arc<dyn ActorSource> {
        Arc::clone(&self.actor) as Arc<dyn ActorSource>
    }

    /// The current settings, in typed form.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn settings(&self) -> Result<Settings, StoreError> {
        let record = self.inner.get_or_create(SETTINGS_RECORD_ID).await?;
        let str_field = |name: &str| {
            record
                .field(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        Ok(Settings {
            assessor: str_field("assessor"),
            provider: record
                .field("provider")
                .and_then(Value::as_str)
                .and_then(CloudProvider::parse)
                .unwrap_or(CloudProvider::Aws),
            theme: record
                .field("theme")
                .and_then(Value::as_str)
                .and_then(Theme::parse)
                .unwrap_or(Theme::Light),
        })
    }

    /// Set the assessor name used for attribution from now on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn set_assessor(&self, name: &str) -> Result<(), StoreError> {
        self.inner
            .update_field(SETTINGS_RECORD_ID, "assessor", Value::String(name.to_owned()))
            .await?;
        self.actor.set(Some(name.to_owned()));
        Ok(())
    }

    /// Set the active cloud provider.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn set_provider(&self, provider: CloudProvider) -> Result<(), StoreError> {
        self.inner
            .update_field(
                SETTINGS_RECORD_ID,
                "provider",
                Value::String(provider.as_str().to_owned()),
            )
            .await
    }

    /// Set the UI theme.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn set_theme(&self, theme: Theme) -> Result<(), StoreError> {
        self.inner
            .update_field(
                SETTINGS_RECORD_ID,
                "theme",
                Value::String(theme.as_str().to_owned()),
            )
            .await
    }

    async fn refresh_actor(&self) -> Result<(), StoreError> {
        let settings = self.settings().await?;
        self.actor.set(Some(settings.assessor));
        Ok(())
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").finish_non_exhaustive()
    }
}
