/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Runtime`]: a live space, its replay twin, a reducer for each, and the error log they share.
//!
//! ## Lifecycle
//!
//! [`Runtime::create`] runs the whole bootstrap before handing out the runtime:
//! 1. Open the [storage context](StorageContext) at the configured location, failing if another runtime
//!    holds it.
//! 2. Set up the live and replay spaces over the configured [storage mode](StorageMode), each wrapped
//!    in a [`ChargingSpace`] with its own [`CostAccounting`].
//! 3. Install every [system process](crate::interpreter::system_processes) in both spaces.
//! 4. Seed the [registry](crate::interpreter::registry) root in both spaces, if enabled.
//! 5. Checkpoint both spaces.
//!
//! Steps 3 and 4 run under an unlimited budget. Any anomaly in them fails `create` with
//! [`InterpreterError::Setup`]; errors of the underlying store are returned unchanged.
//!
//! [`Runtime::close`] closes the live space, then the replay space, then the storage context. Every
//! method of a closed runtime fails with [`InterpreterError::RuntimeClosed`].
//!
//! ## Example
//!
//! ```no_run
//! use rho_casper::{
//!     accounting::Cost,
//!     rspace::history::StorageMode,
//!     runtime::{Runtime, RuntimeConfiguration},
//!     types::{crypto_primitives::Blake2b512Random, term::{Process, Term}},
//! };
//!
//! let config = RuntimeConfiguration::builder()
//!     .storage_location("/var/lib/node/rspace")
//!     .storage_size_limit(1 << 30)
//!     .storage_mode(StorageMode::Persistent)
//!     .build();
//! let mut runtime = Runtime::create(config).unwrap();
//!
//! let hello = Process::send(Term::Uri("rho:io:stdout".into()), vec![Term::Str("Hello".into())]);
//! let result = runtime
//!     .evaluate(&hello, Cost::new(10_000), Blake2b512Random::create_from_bytes(b"deploy"))
//!     .unwrap();
//! assert!(result.errors.is_empty());
//!
//! runtime.close().unwrap();
//! ```

use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::SystemTime,
};

use fs2::{lock_contended_error, FileExt};
use typed_builder::TypedBuilder;

use crate::{
    accounting::{charging_space::ChargingSpace, Cost, CostAccounting},
    events::*,
    interpreter::{
        errors::{ErrorLog, InterpreterError},
        reduce::Reducer,
        registry::inject_empty_registry_root,
        system_processes::{
            all_definitions, dispatch_table, introduce_system_processes, std_output, urn_map,
            FixedChannels, OutputSink,
        },
    },
    logging::Logger,
    rspace::{
        errors::StoreError,
        history::{open_history, StorageMode},
        internal::Checkpoint,
        matcher::FreeVarMatcher,
        pluggables::{ReplayTuplespace, Tuplespace},
        trace::Log,
        RSpace, ReplayRSpace,
    },
    types::{
        crypto_primitives::Blake2b512Random,
        term::{Process, Term},
    },
};

pub type LiveSpace = ChargingSpace<RSpace>;

pub type ReplaySpace = ChargingSpace<ReplayRSpace>;

/// Stores all parameters required to create a [Runtime].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [RuntimeConfiguration]. On the builder call the following methods to construct a valid [RuntimeConfiguration].

    Required:
    - `.storage_location(...)`
    - `.storage_size_limit(...)`
    - `.storage_mode(...)`

    Optional:
    - `.bootstrap_registry(...)`
    - `.log_events(...)`
    - `.output(...)`
"))]
pub struct RuntimeConfiguration {
    #[builder(setter(into, doc = "Set the directory the runtime's storage context lives in. Required."))]
    pub storage_location: PathBuf,
    #[builder(setter(doc = "Set the maximum size, in bytes, of each space's history file. Required."))]
    pub storage_size_limit: u64,
    #[builder(setter(doc = "Set where the spaces keep their committed state. Required."))]
    pub storage_mode: StorageMode,
    #[builder(default = true, setter(doc = "Seed the registry root on creation? Must be disabled when reopening persistent storage that was already seeded. Defaults to true."))]
    pub bootstrap_registry: bool,
    #[builder(default = false, setter(doc = "Enable event logging? Defaults to false."))]
    pub log_events: bool,
    #[builder(default = std_output(), setter(doc = "Set the sink the standard output and standard error processes print to. Defaults to the process's stdout and stderr."))]
    pub output: Arc<dyn OutputSink>,
}

/// The directory a runtime keeps its storage in, locked for exclusive use by one runtime.
///
/// The lock is an advisory lock on the `LOCK` file, held by the open file handle. The operating system
/// releases it when the process exits, so a crashed runtime leaves no stale lock behind.
pub struct StorageContext {
    location: PathBuf,
    lock: Option<File>,
}

impl StorageContext {
    const LOCK_FILE: &'static str = "LOCK";

    pub fn open(location: &Path) -> Result<StorageContext, InterpreterError> {
        fs::create_dir_all(location).map_err(StoreError::from)?;
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(location.join(Self::LOCK_FILE))
            .map_err(StoreError::from)?;
        if let Err(err) = lock.try_lock_exclusive() {
            if err.kind() == lock_contended_error().kind() {
                return Err(InterpreterError::ContextLocked(location.to_path_buf()));
            }
            return Err(StoreError::from(err).into());
        }
        Ok(StorageContext {
            location: location.to_path_buf(),
            lock: Some(lock),
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Release the lock on the directory.
    pub fn close(&mut self) -> Result<(), InterpreterError> {
        if let Some(lock) = self.lock.take() {
            lock.unlock().map_err(StoreError::from)?;
        }
        Ok(())
    }
}

impl Drop for StorageContext {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            let _ = lock.unlock();
        }
    }
}

/// What evaluating a process cost, the errors it raised, and the events it recorded.
///
/// If `errors` is not empty, every change the evaluation made to the space has been rolled back.
pub struct EvaluateResult {
    pub cost: Cost,
    pub errors: Vec<InterpreterError>,
    pub log: Log,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RuntimeState {
    Ready,
    Closed,
}

pub struct Runtime {
    space: Arc<Mutex<LiveSpace>>,
    replay_space: Arc<Mutex<ReplaySpace>>,
    reducer: Reducer,
    replay_reducer: Reducer,
    cost: CostAccounting,
    replay_cost: CostAccounting,
    error_log: ErrorLog,
    urn_map: HashMap<String, Term>,
    context: StorageContext,
    state: RuntimeState,
    log_events: bool,
}

impl Runtime {
    pub fn create(config: RuntimeConfiguration) -> Result<Runtime, InterpreterError> {
        let context = StorageContext::open(&config.storage_location)?;

        let cost = CostAccounting::new(Cost::new(0));
        let replay_cost = CostAccounting::new(Cost::new(0));
        let (space, replay_space) = setup_rspace(&config, &cost, &replay_cost)?;

        let definitions = all_definitions();
        let urn_map = urn_map(&definitions);
        let error_log = ErrorLog::new();

        let reducer = Reducer::new(
            space.clone(),
            dispatch_table(&definitions),
            urn_map.clone(),
            cost.clone(),
            error_log.clone(),
            config.output.clone(),
        );
        let replay_reducer = Reducer::new(
            replay_space.clone(),
            dispatch_table(&definitions),
            urn_map.clone(),
            replay_cost.clone(),
            error_log.clone(),
            config.output.clone(),
        );

        cost.with_budget(Cost::unsafe_max(), || {
            introduce_system_processes(&mut *space.lock().unwrap(), &definitions)
        })?;
        replay_cost.with_budget(Cost::unsafe_max(), || {
            introduce_system_processes(&mut *replay_space.lock().unwrap(), &definitions)
        })?;
        if config.log_events {
            InstallSystemProcessesEvent::get_logger()(&InstallSystemProcessesEvent {
                timestamp: SystemTime::now(),
                processes: definitions.len(),
            });
        }

        if config.bootstrap_registry {
            cost.with_budget(Cost::unsafe_max(), || {
                replay_cost.with_budget(Cost::unsafe_max(), || {
                    inject_empty_registry_root(
                        &mut *space.lock().unwrap(),
                        &mut *replay_space.lock().unwrap(),
                    )
                })
            })?;
            if config.log_events {
                InjectRegistryRootEvent::get_logger()(&InjectRegistryRootEvent {
                    timestamp: SystemTime::now(),
                    root_channel: match FixedChannels::reg_root() {
                        Term::Private(bytes) => bytes,
                        _ => Vec::new(),
                    },
                });
            }
        }

        let checkpoint = space.lock().unwrap().create_checkpoint()?;
        replay_space.lock().unwrap().create_checkpoint()?;

        if config.log_events {
            CreateRuntimeEvent::get_logger()(&CreateRuntimeEvent {
                timestamp: SystemTime::now(),
                storage_location: config.storage_location.clone(),
                storage_mode: config.storage_mode,
                root: checkpoint.root,
            });
        }

        Ok(Runtime {
            space,
            replay_space,
            reducer,
            replay_reducer,
            cost,
            replay_cost,
            error_log,
            urn_map,
            context,
            state: RuntimeState::Ready,
            log_events: config.log_events,
        })
    }

    /// Evaluate `process` in the live space with a budget of `phlo`.
    ///
    /// Errors raised by contract code, including running out of phlogistons, are returned in the
    /// result, and roll back the evaluation. Errors of the underlying store are returned as `Err`, after
    /// rolling back.
    pub fn evaluate(
        &mut self,
        process: &Process,
        phlo: Cost,
        rand: Blake2b512Random,
    ) -> Result<EvaluateResult, InterpreterError> {
        self.check_ready()?;
        let checkpoint = self.space.lock().unwrap().create_soft_checkpoint();
        let recorded = checkpoint.log.len();

        self.cost.set(phlo);
        let result = self.reducer.eval(process, rand);
        let cost = phlo - self.cost.get();

        let mut space = self.space.lock().unwrap();
        let log = space.create_soft_checkpoint().log.split_off(recorded);
        let errors = match collect_errors(result, &self.error_log) {
            Ok(errors) => errors,
            Err(err) => {
                space.revert_to_soft_checkpoint(checkpoint);
                return Err(err);
            }
        };
        if !errors.is_empty() {
            space.revert_to_soft_checkpoint(checkpoint);
        }
        drop(space);

        if self.log_events {
            EvaluateEvent::get_logger()(&EvaluateEvent {
                timestamp: SystemTime::now(),
                cost,
                errors: errors.len(),
            });
        }
        Ok(EvaluateResult { cost, errors, log })
    }

    /// Re-evaluate `process` in the replay space, checking that it performs exactly the COMMs of `log`.
    ///
    /// A divergence from `log` is returned as `Err(InterpreterError::Replay(..))`, after rolling back.
    pub fn replay_evaluate(
        &mut self,
        log: &Log,
        process: &Process,
        phlo: Cost,
        rand: Blake2b512Random,
    ) -> Result<EvaluateResult, InterpreterError> {
        self.check_ready()?;
        let checkpoint = {
            let mut replay_space = self.replay_space.lock().unwrap();
            replay_space.rig(log);
            replay_space.create_soft_checkpoint()
        };
        let recorded = checkpoint.log.len();

        self.replay_cost.set(phlo);
        let result = self.replay_reducer.eval(process, rand);
        let cost = phlo - self.replay_cost.get();

        let mut replay_space = self.replay_space.lock().unwrap();
        let replay_log = replay_space.create_soft_checkpoint().log.split_off(recorded);
        let errors = match collect_errors(result, &self.error_log)
            .and_then(|errors| {
                replay_space
                    .check_replay_data()
                    .map(|_| errors)
                    .map_err(InterpreterError::from)
            })
        {
            Ok(errors) => errors,
            Err(err) => {
                replay_space.revert_to_soft_checkpoint(checkpoint);
                replay_space.rig(&Log::new());
                return Err(err);
            }
        };
        if !errors.is_empty() {
            replay_space.revert_to_soft_checkpoint(checkpoint);
        }
        drop(replay_space);

        if self.log_events {
            ReplayEvaluateEvent::get_logger()(&ReplayEvaluateEvent {
                timestamp: SystemTime::now(),
                cost,
                errors: errors.len(),
                rigged_events: log.len(),
            });
        }
        Ok(EvaluateResult {
            cost,
            errors,
            log: replay_log,
        })
    }

    /// Commit the live space, returning its root hash and the events recorded since the last checkpoint.
    pub fn create_checkpoint(&mut self) -> Result<Checkpoint, InterpreterError> {
        self.check_ready()?;
        Ok(self.space.lock().unwrap().create_checkpoint()?)
    }

    /// Commit the replay space.
    pub fn create_replay_checkpoint(&mut self) -> Result<Checkpoint, InterpreterError> {
        self.check_ready()?;
        Ok(self.replay_space.lock().unwrap().create_checkpoint()?)
    }

    /// Take every error recorded by contract code since the last call, leaving the error log empty.
    pub fn read_and_clear_error_vector(&self) -> Result<Vec<InterpreterError>, InterpreterError> {
        self.check_ready()?;
        Ok(self.error_log.read_and_clear())
    }

    /// Close the live space, the replay space, and the storage context, in that order.
    pub fn close(&mut self) -> Result<(), InterpreterError> {
        self.check_ready()?;
        self.state = RuntimeState::Closed;
        self.space.lock().unwrap().close()?;
        self.replay_space.lock().unwrap().close()?;
        self.context.close()?;

        if self.log_events {
            CloseRuntimeEvent::get_logger()(&CloseRuntimeEvent {
                timestamp: SystemTime::now(),
                storage_location: self.context.location().to_path_buf(),
            });
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state == RuntimeState::Closed
    }

    /// The terms contract code receives for the public URNs, e.g., `rho:io:stdout`.
    pub fn urn_map(&self) -> &HashMap<String, Term> {
        &self.urn_map
    }

    pub fn space(&self) -> Arc<Mutex<LiveSpace>> {
        self.space.clone()
    }

    pub fn replay_space(&self) -> Arc<Mutex<ReplaySpace>> {
        self.replay_space.clone()
    }

    fn check_ready(&self) -> Result<(), InterpreterError> {
        match self.state {
            RuntimeState::Ready => Ok(()),
            RuntimeState::Closed => Err(InterpreterError::RuntimeClosed),
        }
    }
}

/// Create the live and replay spaces, each charging against its own cost accounting.
fn setup_rspace(
    config: &RuntimeConfiguration,
    cost: &CostAccounting,
    replay_cost: &CostAccounting,
) -> Result<(Arc<Mutex<LiveSpace>>, Arc<Mutex<ReplaySpace>>), InterpreterError> {
    let history = open_history(
        config.storage_mode,
        &config.storage_location,
        "live",
        config.storage_size_limit,
    )?;
    let replay_history = open_history(
        config.storage_mode,
        &config.storage_location,
        "replay",
        config.storage_size_limit,
    )?;

    let space = ChargingSpace::new(
        RSpace::create(history, FreeVarMatcher::new(cost.clone())),
        cost.clone(),
    );
    let replay_space = ChargingSpace::new(
        ReplayRSpace::create(replay_history, FreeVarMatcher::new(replay_cost.clone())),
        replay_cost.clone(),
    );
    Ok((Arc::new(Mutex::new(space)), Arc::new(Mutex::new(replay_space))))
}

/// Drain the error log into the errors of an evaluation. A fatal error that aborted the evaluation is
/// placed first; an error of the underlying store is returned as `Err` instead.
fn collect_errors(
    result: Result<(), InterpreterError>,
    error_log: &ErrorLog,
) -> Result<Vec<InterpreterError>, InterpreterError> {
    let mut errors = error_log.read_and_clear();
    match result {
        Ok(()) => Ok(errors),
        Err(err @ (InterpreterError::Store(_) | InterpreterError::Replay(_))) => Err(err),
        Err(err) => {
            errors.insert(0, err);
            Ok(errors)
        }
    }
}
