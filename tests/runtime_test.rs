/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for the runtime's lifecycle: bootstrapping, storage contexts and modes, metered evaluation,
//! and replay.

use std::fs;

use log::LevelFilter;

use rho_casper::{
    accounting::{
        costs::{storage_cost, MATCH_TERM_COST, RECEIVE_EVAL_COST},
        Cost, CostAccounting,
    },
    interpreter::{
        errors::InterpreterError,
        registry::{bootstrap_rand, inject_empty_registry_root},
        system_processes::{all_definitions, introduce_system_processes, FixedChannels},
    },
    rspace::{
        errors::{ReplayError, StoreError},
        history::{MemHistory, StorageMode},
        matcher::FreeVarMatcher,
        pluggables::{ReplayTuplespace, Tuplespace},
        trace::Event,
        RSpace,
    },
    runtime::{Runtime, RuntimeConfiguration},
    types::term::{
        BindPattern, ListParWithRandom, ParWithRandom, Process, ReceiveBind, TaggedContinuation,
        Term, Var,
    },
};

mod common;

use common::{
    logging::setup_logger,
    runtime::{
        config, data_on, evaluate_ok, rand, remove_location, replay_data_on, temp_location, PHLO,
    },
};

fn stdout_hello() -> Process {
    Process::send(
        Term::Uri("rho:io:stdout".to_string()),
        vec![Term::Str("Hello".to_string())],
    )
}

#[test]
fn create_bootstraps_both_spaces_test() {
    setup_logger(LevelFilter::Trace);

    let location = temp_location("bootstrap");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    let root = FixedChannels::reg_root();
    assert_eq!(data_on(&runtime, &root), vec![vec![Term::empty_map()]]);
    assert_eq!(replay_data_on(&runtime, &root), vec![vec![Term::empty_map()]]);

    for definition in all_definitions() {
        let channels = vec![definition.fixed_channel.clone()];
        let live = runtime
            .space()
            .lock()
            .unwrap()
            .get_waiting_continuations(&channels)
            .unwrap();
        let replay = runtime
            .replay_space()
            .lock()
            .unwrap()
            .get_waiting_continuations(&channels)
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(replay.len(), 1);
    }

    assert!(runtime.urn_map().contains_key("rho:io:stdout"));
    assert!(runtime.urn_map().contains_key("rho:registry:insertSigned:ed25519"));

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn create_without_registry_test() {
    let location = temp_location("no_registry");
    let mut config = config(&location, StorageMode::InMemory);
    config.bootstrap_registry = false;
    let mut runtime = Runtime::create(config).unwrap();

    assert!(data_on(&runtime, &FixedChannels::reg_root()).is_empty());

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn bootstrap_twice_fails_test() {
    let location = temp_location("bootstrap_twice");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    {
        let space = runtime.space();
        let replay_space = runtime.replay_space();
        let mut space = space.lock().unwrap();
        let mut replay_space = replay_space.lock().unwrap();

        match inject_empty_registry_root(&mut *space, &mut *replay_space) {
            Err(InterpreterError::Setup(msg)) => {
                assert_eq!(msg, "Registry root channel is not empty.")
            }
            _ => panic!("a second registry bootstrap must fail"),
        }

        assert!(matches!(
            introduce_system_processes(&mut *space, &all_definitions()),
            Err(InterpreterError::Setup(_))
        ));
    }

    runtime.close().unwrap();
    remove_location(&location);
}

fn without_registry(location: &std::path::Path) -> Runtime {
    let mut config = config(location, StorageMode::InMemory);
    config.bootstrap_registry = false;
    Runtime::create(config).unwrap()
}

/// Wait on the registry root channel with an empty body.
fn listen_on_registry_root<T: Tuplespace + ?Sized>(space: &mut T) {
    let result = space
        .consume(
            vec![FixedChannels::reg_root()],
            vec![BindPattern::free_vars(1, None)],
            TaggedContinuation::ParBody(ParWithRandom {
                body: Process::Nil,
                random_state: rand("root listener"),
            }),
            false,
        )
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn registry_insertion_fires_in_live_space_test() {
    let location = temp_location("registry_fires_live");
    let mut runtime = without_registry(&location);

    {
        let space = runtime.space();
        let replay_space = runtime.replay_space();
        let mut space = space.lock().unwrap();
        let mut replay_space = replay_space.lock().unwrap();
        space.cost().set(PHLO);
        replay_space.cost().set(PHLO);

        listen_on_registry_root(&mut *space);
        match inject_empty_registry_root(&mut *space, &mut *replay_space) {
            Err(InterpreterError::Setup(msg)) => {
                assert_eq!(msg, "Registry insertion fired continuation.")
            }
            _ => panic!("a listener on the registry root must fail the bootstrap"),
        }

        // The replay space is not seeded once the live space failed.
        assert!(replay_space
            .get_data(&FixedChannels::reg_root())
            .unwrap()
            .is_empty());
    }

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn registry_insertion_fires_in_replay_space_test() {
    let location = temp_location("registry_fires_replay");
    let mut runtime = without_registry(&location);

    {
        let space = runtime.space();
        let replay_space = runtime.replay_space();
        let mut space = space.lock().unwrap();
        let mut replay_space = replay_space.lock().unwrap();
        space.cost().set(PHLO);
        replay_space.cost().set(PHLO);

        // Record the COMM of the root insertion meeting a listener, then leave the live space empty.
        listen_on_registry_root(&mut *space);
        let root = ListParWithRandom::new(vec![Term::empty_map()], bootstrap_rand());
        assert!(space
            .produce(FixedChannels::reg_root(), root, false)
            .unwrap()
            .is_some());
        let log = space.create_soft_checkpoint().log;
        assert!(space
            .get_waiting_continuations(&[FixedChannels::reg_root()])
            .unwrap()
            .is_empty());

        // Only the replay space listens, and it is rigged to allow the COMM.
        replay_space.rig(&log);
        listen_on_registry_root(&mut *replay_space);

        match inject_empty_registry_root(&mut *space, &mut *replay_space) {
            Err(InterpreterError::Setup(msg)) => {
                assert_eq!(msg, "Registry insertion in replay fired continuation.")
            }
            _ => panic!("a listener on the replay registry root must fail the bootstrap"),
        }
        assert_eq!(space.get_data(&FixedChannels::reg_root()).unwrap().len(), 1);
    }

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn install_that_fires_immediately_fails_test() {
    let cost = CostAccounting::new(Cost::unsafe_max());
    let mut space = RSpace::create(Box::new(MemHistory::new()), FreeVarMatcher::new(cost));

    // Data already waits on the standard output channel.
    let stdout: Vec<_> = all_definitions()
        .into_iter()
        .filter(|def| def.fixed_channel == FixedChannels::stdout())
        .collect();
    assert_eq!(stdout.len(), 1);
    let early = ListParWithRandom::new(vec![Term::Str("early".to_string())], rand("early"));
    assert!(space
        .produce(FixedChannels::stdout(), early, false)
        .unwrap()
        .is_none());

    match introduce_system_processes(&mut space, &stdout) {
        Err(InterpreterError::Setup(msg)) => {
            assert_eq!(msg, "Installing can be done only on startup")
        }
        _ => panic!("an install that fires must fail"),
    }
}

#[test]
fn storage_context_is_exclusive_test() {
    let location = temp_location("exclusive");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    match Runtime::create(config(&location, StorageMode::InMemory)) {
        Err(InterpreterError::ContextLocked(path)) => assert_eq!(path, location),
        _ => panic!("two runtimes must not share a storage context"),
    }

    runtime.close().unwrap();
    let mut reopened = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();
    reopened.close().unwrap();
    remove_location(&location);
}

#[test]
fn stale_lock_file_test() {
    let location = temp_location("stale_lock");
    fs::create_dir_all(&location).unwrap();
    fs::write(location.join("LOCK"), b"left by a crashed runtime").unwrap();

    // The file alone does not lock the context; a runtime holding it does.
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();
    assert!(matches!(
        Runtime::create(config(&location, StorageMode::InMemory)),
        Err(InterpreterError::ContextLocked(_))
    ));

    // Dropping a runtime without closing it releases the context too.
    drop(runtime);
    runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();
    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn closed_runtime_test() {
    let location = temp_location("closed");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();
    runtime.close().unwrap();

    assert!(runtime.is_closed());
    assert!(matches!(
        runtime.evaluate(&stdout_hello(), PHLO, rand("closed")),
        Err(InterpreterError::RuntimeClosed)
    ));
    assert!(matches!(
        runtime.read_and_clear_error_vector(),
        Err(InterpreterError::RuntimeClosed)
    ));
    assert!(matches!(
        runtime.create_checkpoint(),
        Err(InterpreterError::RuntimeClosed)
    ));
    assert!(matches!(runtime.close(), Err(InterpreterError::RuntimeClosed)));
    remove_location(&location);
}

#[test]
fn evaluate_records_events_test() {
    let location = temp_location("evaluate");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    let chan = Term::Private(b"mailbox".to_vec());
    let result = evaluate_ok(
        &mut runtime,
        &Process::Par(vec![
            Process::send(chan.clone(), vec![Term::Int(1)]),
            Process::send(chan.clone(), vec![Term::Int(2)]),
        ]),
        "evaluate",
    );

    assert!(result.cost > Cost::new(0));
    assert_eq!(result.log.len(), 2);
    assert!(result.log.iter().all(|event| matches!(event, Event::Produce(_))));
    assert_eq!(data_on(&runtime, &chan).len(), 2);
    assert!(runtime.read_and_clear_error_vector().unwrap().is_empty());

    // The checkpoint holds every event since the previous one.
    let checkpoint = runtime.create_checkpoint().unwrap();
    assert_eq!(checkpoint.log, result.log);
    assert_eq!(data_on(&runtime, &chan).len(), 2);

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn receive_continues_with_matched_values_test() {
    let location = temp_location("receive");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    // for (x <- @"in") { @"out"!(x) } | @"in"!(42)
    let input = Term::Private(b"in".to_vec());
    let output = Term::Private(b"out".to_vec());
    let process = Process::Par(vec![
        Process::receive(
            vec![ReceiveBind::new(
                input.clone(),
                BindPattern::free_vars(1, None),
            )],
            Process::send(output.clone(), vec![Term::Var(Var::Bound(0))]),
        ),
        Process::send(input.clone(), vec![Term::Int(42)]),
    ]);
    let result = evaluate_ok(&mut runtime, &process, "receive");

    assert!(data_on(&runtime, &input).is_empty());
    assert_eq!(data_on(&runtime, &output), vec![vec![Term::Int(42)]]);
    assert!(result
        .log
        .iter()
        .any(|event| matches!(event, Event::Comm(_))));

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn out_of_phlogistons_rolls_back_test() {
    let location = temp_location("out_of_phlo");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    let chan = Term::Private(b"expensive".to_vec());
    let process = Process::send(chan.clone(), vec![Term::Str("a".repeat(1000))]);
    let result = runtime
        .evaluate(&process, Cost::new(100), rand("out_of_phlo"))
        .unwrap();

    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        result.errors[0],
        InterpreterError::OutOfPhlogistons(_)
    ));
    assert_eq!(result.cost, Cost::new(100));
    assert!(data_on(&runtime, &chan).is_empty());

    // The runtime is still usable.
    let result = evaluate_ok(&mut runtime, &process, "out_of_phlo");
    assert!(result.cost > Cost::new(100));
    assert_eq!(data_on(&runtime, &chan).len(), 1);

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn persistent_loop_exhausts_budget_test() {
    let location = temp_location("persistent_loop");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    // for (_ <= @"loop") { Nil } | @"loop"!!(1)
    let chan = Term::Str("loop".to_string());
    let process = Process::Par(vec![
        Process::Receive {
            binds: vec![ReceiveBind::new(
                chan.clone(),
                BindPattern::free_vars(1, None),
            )],
            body: Box::new(Process::Nil),
            persistent: true,
        },
        Process::Send {
            chan: chan.clone(),
            data: vec![Term::Int(1)],
            persistent: true,
        },
    ]);
    let phlo = Cost::new(10_000_000);
    let result = runtime
        .evaluate(&process, phlo, rand("persistent loop"))
        .unwrap();

    assert!(matches!(
        result.errors.as_slice(),
        [InterpreterError::OutOfPhlogistons(_)]
    ));
    assert_eq!(result.cost, phlo);
    assert!(data_on(&runtime, &chan).is_empty());
    assert!(runtime
        .space()
        .lock()
        .unwrap()
        .get_waiting_continuations(&[chan])
        .unwrap()
        .is_empty());

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn out_of_phlogistons_while_matching_test() {
    let location = temp_location("matcher_out_of_phlo");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    let chan = Term::Private(b"scan".to_vec());
    let sends = (0..100)
        .map(|i| Process::send(chan.clone(), vec![Term::Int(i)]))
        .collect();
    evaluate_ok(&mut runtime, &Process::Par(sends), "fill");
    assert_eq!(data_on(&runtime, &chan).len(), 100);

    // for (@-1 <- @"scan") { Nil } compares its pattern with every stored datum, and none matches.
    let pattern = BindPattern {
        patterns: vec![Term::Int(-1)],
        remainder: None,
        free_count: 0,
    };
    let receive = Process::receive(
        vec![ReceiveBind::new(chan.clone(), pattern.clone())],
        Process::Nil,
    );
    let seed = rand("scan");
    let continuation = TaggedContinuation::ParBody(ParWithRandom {
        body: Process::Nil,
        random_state: seed.clone(),
    });

    // Enough to store the receive and compare ten data.
    let before_matching = RECEIVE_EVAL_COST
        + storage_cost(&vec![chan.clone()])
        + storage_cost(&vec![pattern])
        + storage_cost(&continuation);
    let phlo = before_matching + Cost::new(10);
    let result = runtime.evaluate(&receive, phlo, seed).unwrap();

    match result.errors.as_slice() {
        [InterpreterError::OutOfPhlogistons(err)] => {
            assert_eq!(err.requested, MATCH_TERM_COST);
            assert_eq!(err.remaining, Cost::new(0));
        }
        errors => panic!("expected running out of phlogistons, got {:?}", errors),
    }
    assert_eq!(result.cost, phlo);
    assert_eq!(data_on(&runtime, &chan).len(), 100);
    assert!(runtime
        .space()
        .lock()
        .unwrap()
        .get_waiting_continuations(&[chan])
        .unwrap()
        .is_empty());

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn replay_reproduces_live_evaluation_test() {
    let location = temp_location("replay");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    let ack = Term::Private(b"ack".to_vec());
    let process = Process::Par(vec![
        stdout_hello(),
        Process::send(
            Term::Uri("rho:io:stdoutAck".to_string()),
            vec![Term::Str("Hi".to_string()), ack.clone()],
        ),
    ]);
    let live = evaluate_ok(&mut runtime, &process, "replay");
    assert!(live.log.iter().any(|event| matches!(event, Event::Comm(_))));

    let replay = runtime
        .replay_evaluate(&live.log, &process, PHLO, rand("replay"))
        .unwrap();
    assert!(replay.errors.is_empty());
    assert_eq!(replay.cost, live.cost);
    assert_eq!(replay.log, live.log);
    assert_eq!(replay_data_on(&runtime, &ack), data_on(&runtime, &ack));

    let live_root = runtime.create_checkpoint().unwrap().root;
    let replay_root = runtime.create_replay_checkpoint().unwrap().root;
    assert_eq!(live_root, replay_root);

    runtime.close().unwrap();
    remove_location(&location);
}

#[test]
fn replay_divergence_test() {
    let location = temp_location("replay_divergence");
    let mut runtime = Runtime::create(config(&location, StorageMode::InMemory)).unwrap();

    let live = evaluate_ok(&mut runtime, &stdout_hello(), "divergence");

    // A different message produces a COMM that is not in the log.
    let other = Process::send(
        Term::Uri("rho:io:stdout".to_string()),
        vec![Term::Str("Goodbye".to_string())],
    );
    assert!(matches!(
        runtime.replay_evaluate(&live.log, &other, PHLO, rand("divergence")),
        Err(InterpreterError::Replay(ReplayError::UnexpectedComm { .. }))
    ));

    // Doing nothing leaves the logged COMM unused.
    assert!(matches!(
        runtime.replay_evaluate(&live.log, &Process::Nil, PHLO, rand("divergence")),
        Err(InterpreterError::Replay(ReplayError::UnusedComms { count: 1 }))
    ));

    // The replay space was left untouched, so the faithful replay still succeeds.
    let replay = runtime
        .replay_evaluate(&live.log, &stdout_hello(), PHLO, rand("divergence"))
        .unwrap();
    assert!(replay.errors.is_empty());

    runtime.close().unwrap();
    remove_location(&location);
}

fn check_reopen(mode: StorageMode) {
    let location = temp_location("reopen");
    let chan = Term::Private(b"kept".to_vec());

    let mut runtime = Runtime::create(config(&location, mode)).unwrap();
    evaluate_ok(
        &mut runtime,
        &Process::send(chan.clone(), vec![Term::Str("across restarts".to_string())]),
        "reopen",
    );
    let root = runtime.create_checkpoint().unwrap().root;
    runtime.close().unwrap();

    // The registry root was persisted too, so seeding it again must fail, and release the context.
    assert!(matches!(
        Runtime::create(config(&location, mode)),
        Err(InterpreterError::Setup(_))
    ));

    let mut config = config(&location, mode);
    config.bootstrap_registry = false;
    let mut reopened = Runtime::create(config).unwrap();
    assert_eq!(
        data_on(&reopened, &chan),
        vec![vec![Term::Str("across restarts".to_string())]]
    );
    assert_eq!(
        data_on(&reopened, &FixedChannels::reg_root()),
        vec![vec![Term::empty_map()]]
    );
    assert_eq!(reopened.create_checkpoint().unwrap().root, root);
    reopened.close().unwrap();
    remove_location(&location);
}

#[test]
fn persistent_storage_reopen_test() {
    check_reopen(StorageMode::Persistent);
}

#[test]
fn mixed_storage_reopen_test() {
    check_reopen(StorageMode::Mixed);
}

#[test]
fn storage_size_limit_test() {
    let location = temp_location("map_full");
    let config = RuntimeConfiguration::builder()
        .storage_location(location.clone())
        .storage_size_limit(64)
        .storage_mode(StorageMode::Persistent)
        .build();

    assert!(matches!(
        Runtime::create(config),
        Err(InterpreterError::Store(StoreError::MapFull { .. }))
    ));
    remove_location(&location);
}

#[test]
fn repeated_checkpoints_stay_within_size_limit_test() {
    let location = temp_location("checkpoint_churn");
    let config = RuntimeConfiguration::builder()
        .storage_location(location.clone())
        .storage_size_limit(4096)
        .storage_mode(StorageMode::Persistent)
        .build();
    let mut runtime = Runtime::create(config).unwrap();

    // The same channel is filled and drained on every round, so the stored rows stay small.
    let chan = Term::Private(b"churn".to_vec());
    let take = Process::receive(
        vec![ReceiveBind::new(chan.clone(), BindPattern::free_vars(1, None))],
        Process::Nil,
    );
    for round in 0..100i64 {
        let put = Process::send(chan.clone(), vec![Term::Int(round)]);
        evaluate_ok(&mut runtime, &put, &format!("put {}", round));
        runtime.create_checkpoint().unwrap();
        evaluate_ok(&mut runtime, &take, &format!("take {}", round));
        runtime.create_checkpoint().unwrap();
    }
    assert!(data_on(&runtime, &chan).is_empty());

    runtime.close().unwrap();
    remove_location(&location);
}
