//! Lifecycle orchestrator.
//!
//! ```text
//! Requested → Validated → DirectoryEnsured → SourceWritten → [ConfirmationPending →]
//!     Compiling → Compiled → Loaded → IdentityVerified → Registered
//! ```
//!
//! Every edge can fail, and every failure is terminal for the request. Source
//! written before a failure stays on disk so the next attempt can repair it. An
//! identifier is never registered unless every stage succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gptchat_core::{CoreConfig, ModuleRegistry};
use tracing::{debug, info, warn};

use crate::admission::{admit, PluginRequest};
use crate::compiler::{BuildJob, CargoToolchain, Toolchain};
use crate::error::{LifecycleStage, PathConfigurationError, PluginError};
use crate::layout::PluginLayout;
use crate::loader::{verify_identity, CapabilityLoader, LibraryLoader};
use crate::operator::{ConfirmationGate, OperatorPrompt};
use crate::persist::persist_source;

pub const SUCCESS_REPLY: &str = "Great! Your plugin has been loaded successfully.\n\n\
    Why don't you check the /help command to see if your new plugin is available.";

/// A plugin registered by this manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRecord {
    pub identifier: String,
    pub source_path: PathBuf,
    pub artifact_path: PathBuf,
    pub loaded: bool,
}

pub struct PluginManager {
    layout: PluginLayout,
    gate: ConfirmationGate,
    toolchain: Box<dyn Toolchain>,
    loader: Box<dyn CapabilityLoader>,
    records: Mutex<BTreeMap<String, PluginRecord>>,
    // Held across a whole creation so two requests never share a source directory.
    creation: Mutex<()>,
}

impl PluginManager {
    /// Fails if either root is missing: no plugin can be created until that is fixed.
    pub fn new(
        layout: PluginLayout,
        gate: ConfirmationGate,
        toolchain: Box<dyn Toolchain>,
        loader: Box<dyn CapabilityLoader>,
    ) -> Result<Self, PathConfigurationError> {
        layout.check_paths()?;
        info!(
            target: "gptchat::plugin",
            source_root = %layout.source_root().display(),
            compiled_root = %layout.compiled_root().display(),
            supervised = gate.is_supervised(),
            "plugin manager ready"
        );
        Ok(Self {
            layout,
            gate,
            toolchain,
            loader,
            records: Mutex::new(BTreeMap::new()),
            creation: Mutex::new(()),
        })
    }

    /// Cargo toolchain, libloading loader and a gate driven by `prompt`.
    pub fn from_config(cfg: &CoreConfig, prompt: Box<dyn OperatorPrompt>) -> Result<Self, PathConfigurationError> {
        let layout = PluginLayout::from_config(cfg);
        let toolchain = CargoToolchain::from_config(cfg, layout.build_root());
        let gate = ConfirmationGate::new(cfg.is_supervised_mode(), cfg.confirmation_timeout(), prompt);
        Self::new(layout, gate, Box::new(toolchain), Box::new(LibraryLoader))
    }

    pub fn layout(&self) -> &PluginLayout {
        &self.layout
    }

    /// Plugins registered through this manager, sorted by identifier.
    pub fn records(&self) -> Vec<PluginRecord> {
        self.lock_records().values().cloned().collect()
    }

    fn lock_records(&self) -> MutexGuard<'_, BTreeMap<String, PluginRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one `/plugin create` request to completion.
    pub fn create(&self, registry: &ModuleRegistry, request: &PluginRequest) -> Result<String, PluginError> {
        let _serial = self.creation.lock().unwrap_or_else(PoisonError::into_inner);
        let id = request.identifier.trim();
        advance(id, LifecycleStage::Requested);

        match self.run(registry, request) {
            Ok(record) => {
                info!(target: "gptchat::plugin", plugin = %record.identifier, artifact = %record.artifact_path.display(), "plugin loaded");
                self.lock_records().insert(record.identifier.clone(), record);
                Ok(SUCCESS_REPLY.to_string())
            }
            Err(e) => {
                warn!(target: "gptchat::plugin", plugin = %id, state = %e.state(), error = %e, "plugin creation failed");
                Err(e)
            }
        }
    }

    fn run(&self, registry: &ModuleRegistry, request: &PluginRequest) -> Result<PluginRecord, PluginError> {
        let admitted = admit(request, registry)?;
        let id = admitted.identifier.as_str();
        advance(id, LifecycleStage::Validated);

        // The roots may have been removed since start-up.
        self.layout.check_paths()?;
        let source_path = persist_source(&self.layout, id, &admitted.source)?;
        advance(id, LifecycleStage::DirectoryEnsured);
        advance(id, LifecycleStage::SourceWritten);

        if self.gate.is_supervised() {
            advance(id, LifecycleStage::ConfirmationPending);
            self.gate.review(id, &source_path)?;
        }

        advance(id, LifecycleStage::Compiling);
        let artifact_path = self.layout.artifact_path(id);
        let built = self.toolchain.build(&BuildJob {
            identifier: id,
            source_path: &source_path,
            artifact_path: &artifact_path,
        })?;
        advance(id, LifecycleStage::Compiled);

        let capability = self.loader.load(&built)?;
        advance(id, LifecycleStage::Loaded);
        verify_identity(id, capability.as_ref())?;
        advance(id, LifecycleStage::IdentityVerified);

        registry.register_capability(capability)?;
        advance(id, LifecycleStage::Registered);

        Ok(PluginRecord {
            identifier: id.to_string(),
            source_path,
            artifact_path: built,
            loaded: true,
        })
    }

    /// Register artifacts left by earlier runs. An artifact is only accepted when
    /// its self-reported identifier equals its file stem. Opening a library runs
    /// its initialisers, so in supervised mode each artifact goes through the
    /// confirmation gate first. Failures are logged and skipped. Returns how many
    /// were registered.
    pub fn load_compiled(&self, registry: &ModuleRegistry) -> usize {
        let _serial = self.creation.lock().unwrap_or_else(PoisonError::into_inner);
        let artifacts = match self.layout.compiled_artifacts() {
            Ok(found) => found,
            Err(e) => {
                warn!(target: "gptchat::plugin", root = %self.layout.compiled_root().display(), error = %e, "cannot scan compiled plugins");
                return 0;
            }
        };

        let mut loaded = 0;
        for (id, path) in artifacts {
            if registry.exists(&id) {
                debug!(target: "gptchat::plugin", plugin = %id, "already registered; skipping artifact");
                continue;
            }
            match self.restore(registry, &id, &path) {
                Ok(()) => {
                    self.lock_records().insert(
                        id.clone(),
                        PluginRecord {
                            identifier: id.clone(),
                            source_path: self.layout.source_file(&id),
                            artifact_path: path,
                            loaded: true,
                        },
                    );
                    info!(target: "gptchat::plugin", plugin = %id, "restored compiled plugin");
                    loaded += 1;
                }
                Err(e) => {
                    warn!(target: "gptchat::plugin", plugin = %id, path = %path.display(), error = %e, "skipping compiled plugin");
                }
            }
        }
        loaded
    }

    fn restore(&self, registry: &ModuleRegistry, id: &str, path: &Path) -> Result<(), PluginError> {
        if self.gate.is_supervised() {
            self.gate.review(id, path)?;
        }
        let capability = self.loader.load(path)?;
        verify_identity(id, capability.as_ref())?;
        registry.register_capability(capability)?;
        Ok(())
    }
}

fn advance(id: &str, stage: LifecycleStage) {
    debug!(target: "gptchat::plugin", plugin = %id, stage = ?stage, "plugin lifecycle");
}
