use std::{
    sync::{mpsc, Arc, Barrier},
    thread,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use deferred::{prelude::*, thread_pool::WorkerThread};
use parking_lot::Mutex;

#[test]
fn runs_on_named_worker() {
    let name = Async::new(
        |_: ()| -> Result<Option<String>> { Ok(thread::current().name().map(str::to_owned)) },
        Executor::named(|index| format!("async-{index}")),
    );
    let name = name.apply(()).unwrap().get().unwrap().unwrap();
    assert!(name.starts_with("async-"), "{name}");
}

#[test]
fn handle_is_pending_while_running() {
    let barrier = Arc::new(Barrier::new(2));
    let gate = Arc::clone(&barrier);
    let slow = Async::new(
        move |n: u32| -> Result<u32> {
            gate.wait();
            gate.wait();
            Ok(n + 1)
        },
        Executor::owned(),
    );
    let handle = slow.apply(6).unwrap();
    barrier.wait();
    assert!(!handle.is_done());
    barrier.wait();
    assert_eq!(handle.get().unwrap(), 7);
}

#[test]
fn dropped_handle_still_runs() {
    let (sender, receiver) = mpsc::channel();
    let sender = Mutex::new(sender);
    let notify = Async::new(
        move |word: &'static str| -> Result<()> {
            sender.lock().send(word)?;
            Ok(())
        },
        Executor::owned(),
    );
    drop(notify.apply("done").unwrap());
    assert_eq!(receiver.recv().unwrap(), "done");
}

#[test]
fn failure_is_wrapped_once() {
    let failing = Async::new(|_: ()| -> Result<()> { Err(anyhow!("bad input")) }, Executor::owned());
    let failure = failing.apply(()).unwrap().get().unwrap_err();
    let Some(Error::Background { source }) = failure.downcast_ref::<Error>() else {
        panic!("unexpected failure: {failure:?}");
    };
    assert_eq!(source.to_string(), "bad input");
    assert!(source.downcast_ref::<Error>().is_none());
    assert_eq!(failure.chain().count(), 2);
}

#[test]
fn owned_pool_shuts_down_after_task() {
    let task = Async::new(
        |n: u8| -> Result<_> {
            let registry = WorkerThread::current_registry();
            Ok((n, registry))
        },
        Executor::owned(),
    );
    let (n, registry) = task.apply(3).unwrap().get().unwrap();
    assert_eq!(n, 3);
    let registry = registry.expect("task ran off the pool");
    assert!(registry.is_shutdown());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !registry.is_terminated() {
        assert!(Instant::now() < deadline, "owned pool worker never exited");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn panic_becomes_failure() {
    let handle = Async::schedule(
        from_fn(|| -> Result<u8> { panic!("background blew up") }),
        Executor::owned(),
    )
    .unwrap();
    let failure = handle.get().unwrap_err();
    assert!(matches!(
        failure.downcast_ref::<Error>(),
        Some(Error::Panicked(message)) if message == "background blew up"
    ));
}

#[test]
fn borrowed_pool_is_left_open() {
    let pool = Builder::new().num_threads(1).build().unwrap();
    let executor = Executor::borrowed(&pool);
    let first = Async::schedule(Constant(5), executor.clone()).unwrap();
    let second = Async::schedule(Reduced::of_values(|a: u8, b: u8| Ok(a * b), [2, 3]), executor).unwrap();
    assert_eq!(first.get().unwrap(), 5);
    assert_eq!(second.get().unwrap(), 6);
    assert!(!pool.is_shutdown());
}

#[test]
fn shut_down_pool_rejects_schedule() {
    let pool = Builder::new().num_threads(1).build().unwrap();
    pool.shutdown();
    let failure = Async::schedule(Constant(1), Executor::borrowed(&pool)).unwrap_err();
    assert!(matches!(failure.downcast_ref::<Error>(), Some(Error::Rejected)));
}

#[test]
fn runs_as_procedure() {
    let (sender, receiver) = mpsc::channel();
    let sender = Mutex::new(sender);
    let pool = Builder::new().num_threads(1).build().unwrap();
    let record = Async::new(
        move |n: u32| -> Result<()> {
            let name = thread::current().name().map(str::to_owned);
            sender.lock().send((n, name))?;
            Ok(())
        },
        Executor::borrowed(&pool),
    );
    Procedure::exec(&record, 4).unwrap();
    let (n, name) = receiver.recv().unwrap();
    assert_eq!(n, 4);
    assert_eq!(name.as_deref(), Some("deferred-worker-0"));
}
