//! Runtime and mock GitHub shared by the steps of one scenario.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use rstest_bdd::Slot;
use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer, Request};

/// Current-thread runtime that can live in an `rstest-bdd` slot.
#[derive(Clone)]
pub struct SharedRuntime(Rc<RefCell<Runtime>>);

impl SharedRuntime {
    fn start() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self(Rc::new(RefCell::new(runtime))))
    }

    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.0.borrow().block_on(future)
    }
}

/// Lazily starts the runtime and the mock GitHub for a scenario.
///
/// # Errors
///
/// Returns an error when the runtime cannot be built.
pub fn ensure_runtime_and_server(
    runtime: &Slot<SharedRuntime>,
    server: &Slot<MockServer>,
) -> io::Result<SharedRuntime> {
    let shared = match runtime.get() {
        Some(existing) => existing,
        None => {
            let created = SharedRuntime::start()?;
            runtime.set(created.clone());
            created
        }
    };
    if server.with_ref(|_| ()).is_none() {
        server.set(shared.block_on(MockServer::start()));
    }
    Ok(shared)
}

/// Mounts every mock on the scenario's server.
pub fn mount_all(runtime: &SharedRuntime, server: &Slot<MockServer>, mocks: Vec<Mock>) -> bool {
    server
        .with_ref(|started| {
            for mock in mocks {
                runtime.block_on(mock.mount(started));
            }
        })
        .is_some()
}

/// Requests the mock GitHub has seen so far, oldest first.
pub fn recorded(runtime: &SharedRuntime, server: &Slot<MockServer>) -> Vec<Request> {
    server
        .with_ref(|started| runtime.block_on(started.received_requests()))
        .flatten()
        .unwrap_or_default()
}
