// ABOUTME: Durable tenant → notification channel registry backed by a JSON file
// ABOUTME: Tolerates missing/empty/corrupt files, migrates legacy shapes, and saves atomically

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::metrics;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Stable tenant identifier (Discord guild id)
    TenantId
);
string_id!(
    /// Identifier of a channel inside a tenant
    ChannelId
);

/// One tenant's configured notification destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    #[serde(rename = "GUILD ID")]
    pub tenant_id: TenantId,
    #[serde(rename = "CHANNEL ID")]
    pub channel_id: ChannelId,
    /// Denormalized display name, refreshed on rename; never used as a key
    #[serde(rename = "GUILD NAME", skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
}

impl RegistryEntry {
    pub fn new(tenant_id: impl Into<TenantId>, channel_id: impl Into<ChannelId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            channel_id: channel_id.into(),
            tenant_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.tenant_name = Some(name.into());
        self
    }

    /// Name for user-facing reports, falling back to the id
    pub fn label(&self) -> &str {
        self.tenant_name
            .as_deref()
            .unwrap_or_else(|| self.tenant_id.as_str())
    }
}

/// What `Registry::set` did, used for the confirmation reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// First destination for this tenant
    Created,
    /// Tenant already had a different destination
    Updated { previous: ChannelId },
    /// Tenant already pointed at this channel
    Unchanged,
}

/// Registry shared between the command path, lifecycle handler, and fan-out.
/// Mutations hold the lock through mutate + save and never across another await.
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// In-memory registry plus the file it persists to.
/// The in-memory copy is authoritative; the file is best-effort durability.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    entries: HashMap<TenantId, RegistryEntry>,
}

impl Registry {
    /// Load the registry from `path`. Never fails: a missing file is created
    /// empty, an empty file is an empty mapping, and a corrupt file is logged
    /// and left untouched until the next save.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        metrics::set_configured_tenants(entries.len());
        tracing::info!(
            path = %path.display(),
            tenants = entries.len(),
            "Channel registry loaded"
        );
        Self { path, entries }
    }

    /// Empty registry that will persist to `path`, without touching the file
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, tenant_id: &TenantId) -> Option<&RegistryEntry> {
        self.entries.get(tenant_id)
    }

    pub fn contains(&self, tenant_id: &TenantId) -> bool {
        self.entries.contains_key(tenant_id)
    }

    /// Owned copy of every entry, ordered by tenant id
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<RegistryEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        entries
    }

    /// Upsert a tenant's destination and persist.
    pub fn set(&mut self, entry: RegistryEntry) -> SetOutcome {
        let outcome = match self.entries.get_mut(&entry.tenant_id) {
            None => {
                self.entries.insert(entry.tenant_id.clone(), entry);
                SetOutcome::Created
            }
            Some(existing) if existing.channel_id == entry.channel_id => {
                if entry.tenant_name.is_none() || existing.tenant_name == entry.tenant_name {
                    return SetOutcome::Unchanged;
                }
                existing.tenant_name = entry.tenant_name;
                SetOutcome::Unchanged
            }
            Some(existing) => {
                let previous = std::mem::replace(&mut existing.channel_id, entry.channel_id);
                if entry.tenant_name.is_some() {
                    existing.tenant_name = entry.tenant_name;
                }
                SetOutcome::Updated { previous }
            }
        };
        self.save();
        outcome
    }

    /// Remove a tenant's destination. Idempotent; only persists when something changed.
    pub fn remove(&mut self, tenant_id: &TenantId) -> Option<RegistryEntry> {
        let removed = self.entries.remove(tenant_id)?;
        self.save();
        Some(removed)
    }

    /// Drop every entry whose tenant is not in `present`, saving once.
    pub fn retain_tenants(&mut self, present: &HashSet<TenantId>) -> Vec<RegistryEntry> {
        let departed: Vec<TenantId> = self
            .entries
            .keys()
            .filter(|id| !present.contains(*id))
            .cloned()
            .collect();
        let removed: Vec<RegistryEntry> = departed
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .collect();
        if !removed.is_empty() {
            self.save();
        }
        removed
    }

    /// Refresh the denormalized display name. Returns true if an entry changed.
    pub fn rename_tenant(&mut self, tenant_id: &TenantId, name: &str) -> bool {
        let Some(entry) = self.entries.get_mut(tenant_id) else {
            return false;
        };
        if entry.tenant_name.as_deref() == Some(name) {
            return false;
        }
        entry.tenant_name = Some(name.to_string());
        self.save();
        true
    }

    /// Persist the full mapping; failures are logged, never returned.
    pub fn save(&self) {
        metrics::set_configured_tenants(self.entries.len());
        if let Err(e) = self.try_save() {
            metrics::record_error("registry_save");
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to save channel registry"
            );
        }
    }

    /// Persist the full mapping, returning any I/O or encoding failure
    pub fn try_save(&self) -> Result<()> {
        let sorted: BTreeMap<&str, &RegistryEntry> = self
            .entries
            .iter()
            .map(|(id, entry)| (id.as_str(), entry))
            .collect();
        write_atomic(&self.path, &sorted)
    }
}

// =============================================================================
// Storage format
// =============================================================================

/// Ids appear as strings in current files and as integers in some older ones
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredId {
    Text(String),
    Number(u64),
}

impl StoredId {
    fn into_string(self) -> String {
        match self {
            StoredId::Text(s) => s,
            StoredId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoredRecord {
    #[serde(rename = "GUILD ID", alias = "guild_id", default)]
    guild_id: Option<StoredId>,
    #[serde(rename = "CHANNEL ID", alias = "channel_id", default)]
    channel_id: Option<StoredId>,
    #[serde(rename = "GUILD NAME", alias = "server_name", default)]
    guild_name: Option<String>,
}

/// Every value shape the registry file has held over time
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    /// `{"<tenantId>": "<channelId>"}`
    Bare(StoredId),
    /// `{"<key>": {"GUILD ID": .., "CHANNEL ID": ..}}` or `{"server_name", "channel_id"}`
    Record(StoredRecord),
}

/// Convert one stored key/value pair into an entry keyed by tenant id.
/// A record whose key differs from its GUILD ID was keyed by display name.
fn migrate_entry(key: &str, value: StoredValue) -> Option<RegistryEntry> {
    match value {
        StoredValue::Bare(channel) => Some(RegistryEntry::new(key, channel.into_string())),
        StoredValue::Record(record) => {
            let Some(channel_id) = record.channel_id else {
                tracing::warn!(key = %key, "Skipping registry entry without a channel id");
                return None;
            };
            let tenant_id = record
                .guild_id
                .map(StoredId::into_string)
                .unwrap_or_else(|| key.to_string());
            let tenant_name = match record.guild_name {
                Some(name) => Some(name),
                None if tenant_id != key => Some(key.to_string()),
                None => None,
            };
            Some(RegistryEntry {
                tenant_id: TenantId::new(tenant_id),
                channel_id: ChannelId::new(channel_id.into_string()),
                tenant_name,
            })
        }
    }
}

/// Parse registry file content. Fails only if the document is not a JSON object;
/// individual unreadable entries are skipped.
pub fn parse_entries(content: &str) -> Result<HashMap<TenantId, RegistryEntry>> {
    let raw: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(content).context("Registry file is not a JSON object")?;

    let mut entries = HashMap::with_capacity(raw.len());
    for (key, value) in raw {
        let stored = match serde_json::from_value::<StoredValue>(value) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping unreadable registry entry");
                continue;
            }
        };
        if let Some(entry) = migrate_entry(&key, stored) {
            if entries.contains_key(&entry.tenant_id) {
                tracing::warn!(
                    tenant_id = %entry.tenant_id,
                    "Duplicate tenant in registry file, keeping the later entry"
                );
            }
            entries.insert(entry.tenant_id.clone(), entry);
        }
    }
    Ok(entries)
}

/// Read the registry mapping from disk following the tolerant load rules
pub fn load_entries(path: &Path) -> HashMap<TenantId, RegistryEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No registry file, creating an empty one");
            if let Err(e) = write_atomic(path, &BTreeMap::<&str, &RegistryEntry>::new()) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to create registry file"
                );
            }
            return HashMap::new();
        }
        Err(e) => {
            metrics::record_error("registry_load");
            tracing::error!(path = %path.display(), error = %e, "Failed to read registry file");
            return HashMap::new();
        }
    };

    if content.trim().is_empty() {
        return HashMap::new();
    }

    match parse_entries(&content) {
        Ok(entries) => entries,
        Err(e) => {
            metrics::record_error("registry_load");
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Registry file is corrupt, starting with an empty registry"
            );
            HashMap::new()
        }
    }
}

/// Write JSON to a temp file beside `path`, then rename it into place
fn write_atomic(path: &Path, entries: &BTreeMap<&str, &RegistryEntry>) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut json = serde_json::to_string_pretty(entries)?;
    json.push('\n');

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
