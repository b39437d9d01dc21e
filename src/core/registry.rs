//! Immutable NPC registry
//!
//! Profiles are loaded once at startup (bundled set or a directory of YAML
//! files, ordered by file name) and only read afterwards. A profile whose
//! `belief` section does not parse stays routable with no belief, so the
//! compiler answers with its fallback prompt.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::core::error::RegistryError;
use crate::types::{BeliefSystem, NpcKind, NpcProfile, NpcRoute};

/// Profiles shipped with the crate, in routing order
const BUNDLED: [(&str, &str); 7] = [
    ("01_linxi.yaml", include_str!("../../beliefs/01_linxi.yaml")),
    ("02_chenhao.yaml", include_str!("../../beliefs/02_chenhao.yaml")),
    ("03_tavern_keeper.yaml", include_str!("../../beliefs/03_tavern_keeper.yaml")),
    ("04_bartender.yaml", include_str!("../../beliefs/04_bartender.yaml")),
    ("05_cook.yaml", include_str!("../../beliefs/05_cook.yaml")),
    ("06_guard.yaml", include_str!("../../beliefs/06_guard.yaml")),
    ("07_local_resident.yaml", include_str!("../../beliefs/07_local_resident.yaml")),
];

/// NPC profiles keyed by id, declaration order preserved
#[derive(Debug, Clone)]
pub struct NpcRegistry {
    profiles: Vec<NpcProfile>,
    index: HashMap<String, usize>,
}

impl NpcRegistry {
    /// Build from profiles in routing order
    pub fn from_profiles(profiles: Vec<NpcProfile>) -> Result<Self, RegistryError> {
        if profiles.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut index = HashMap::with_capacity(profiles.len());
        for (i, profile) in profiles.iter().enumerate() {
            if index.insert(profile.id.clone(), i).is_some() {
                return Err(RegistryError::DuplicateId(profile.id.clone()));
            }
        }
        Ok(Self { profiles, index })
    }

    /// The bundled tavern cast
    pub fn bundled() -> Result<Self, RegistryError> {
        let profiles = BUNDLED
            .iter()
            .map(|(name, text)| parse_profile(name, text))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_profiles(profiles)
    }

    /// Load every `.yaml`/`.yml` file in a directory
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref();
        let io_err = |source| RegistryError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut paths: Vec<_> = fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml")))
            .collect();
        paths.sort();

        let mut profiles = Vec::with_capacity(paths.len());
        for path in paths {
            let label = path.display().to_string();
            let text = fs::read_to_string(&path).map_err(|source| RegistryError::Io {
                path: label.clone(),
                source,
            })?;
            profiles.push(parse_profile(&label, &text)?);
        }

        let registry = Self::from_profiles(profiles)?;
        info!(dir = %dir.display(), npcs = registry.len(), "loaded NPC profiles");
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&NpcProfile> {
        self.index.get(id).map(|&i| &self.profiles[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Display name, or the id itself when unknown
    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|p| p.name.as_str()).unwrap_or(id)
    }

    pub fn profiles(&self) -> &[NpcProfile] {
        &self.profiles
    }

    /// Named characters, in declaration order
    pub fn core(&self) -> impl Iterator<Item = &NpcProfile> {
        self.profiles.iter().filter(|p| p.kind == NpcKind::Core)
    }

    /// Routing candidates, in declaration order
    pub fn routes(&self) -> Vec<NpcRoute> {
        self.profiles.iter().map(NpcProfile::route).collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Parse one profile; a broken `belief` section is dropped, not fatal
pub fn parse_profile(label: &str, text: &str) -> Result<NpcProfile, RegistryError> {
    let yaml_err = |e: serde_yaml::Error| RegistryError::Yaml {
        path: label.to_string(),
        message: e.to_string(),
    };

    let mut value: serde_yaml::Value = serde_yaml::from_str(text).map_err(yaml_err)?;
    let belief_value = value
        .as_mapping_mut()
        .and_then(|m| m.remove(serde_yaml::Value::from("belief")));

    let mut profile: NpcProfile = serde_yaml::from_value(value).map_err(yaml_err)?;
    profile.belief = match belief_value {
        None | Some(serde_yaml::Value::Null) => None,
        Some(raw) => match serde_yaml::from_value::<BeliefSystem>(raw) {
            Ok(belief) => Some(belief),
            Err(e) => {
                warn!(npc_id = %profile.id, file = label, error = %e, "belief section unreadable, NPC will use fallback prompt");
                None
            }
        },
    };
    Ok(profile)
}

// =============================================================================
// TESTS
// =============================================================================
