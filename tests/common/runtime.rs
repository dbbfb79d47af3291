use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use rho_casper::{
    accounting::Cost,
    rspace::{history::StorageMode, pluggables::Tuplespace},
    runtime::{EvaluateResult, Runtime, RuntimeConfiguration},
    types::{
        crypto_primitives::Blake2b512Random,
        term::{Process, Term},
    },
};

/// A budget no test evaluation comes close to exhausting.
pub(crate) const PHLO: Cost = Cost::new(1_000_000);

static NEXT_LOCATION: AtomicUsize = AtomicUsize::new(0);

/// A fresh storage location under the system's temporary directory.
pub(crate) fn temp_location(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "rho_casper_{}_{}_{}_{}",
        name,
        std::process::id(),
        nanos,
        NEXT_LOCATION.fetch_add(1, Ordering::SeqCst)
    ))
}

pub(crate) fn remove_location(location: &Path) {
    let _ = fs::remove_dir_all(location);
}

pub(crate) fn config(location: &Path, mode: StorageMode) -> RuntimeConfiguration {
    RuntimeConfiguration::builder()
        .storage_location(location)
        .storage_size_limit(1 << 26)
        .storage_mode(mode)
        .log_events(true)
        .build()
}

pub(crate) fn rand(seed: &str) -> Blake2b512Random {
    Blake2b512Random::create_from_bytes(seed.as_bytes())
}

/// Evaluate `process` with a generous budget, failing the test if contract code raised any error.
pub(crate) fn evaluate_ok(runtime: &mut Runtime, process: &Process, seed: &str) -> EvaluateResult {
    let result = runtime.evaluate(process, PHLO, rand(seed)).unwrap();
    if let Some(err) = result.errors.first() {
        panic!("evaluation of {:?} raised: {}", process, err);
    }
    result
}

/// The payloads waiting on `chan` in the live space.
pub(crate) fn data_on(runtime: &Runtime, chan: &Term) -> Vec<Vec<Term>> {
    runtime
        .space()
        .lock()
        .unwrap()
        .get_data(chan)
        .unwrap()
        .into_iter()
        .map(|datum| datum.a.pars)
        .collect()
}

/// The payloads waiting on `chan` in the replay space.
pub(crate) fn replay_data_on(runtime: &Runtime, chan: &Term) -> Vec<Vec<Term>> {
    runtime
        .replay_space()
        .lock()
        .unwrap()
        .get_data(chan)
        .unwrap()
        .into_iter()
        .map(|datum| datum.a.pars)
        .collect()
}
