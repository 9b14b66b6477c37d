use prolog_resolve::{LeafAnswer, Machine, Observer, PortEvent, Term};

use parking_lot::Mutex;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test subscriber once per test binary. Set `RUST_LOG` to
/// see engine events.
pub(crate) fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A machine with `program` consulted.
pub(crate) fn machine_with(program: &str) -> Machine {
    init_tracing();

    let machine = Machine::default();
    machine.consult(program).unwrap();
    machine
}

/// Every answer to `query`, panicking on an error.
pub(crate) fn answers(machine: &Machine, query: &str) -> Vec<LeafAnswer> {
    machine
        .query_all(query)
        .unwrap_or_else(|error| panic!("query {query:?} raised {error}"))
}

/// The binding of `name` in each answer to `query`.
pub(crate) fn bindings_of(machine: &Machine, query: &str, name: &str) -> Vec<Term> {
    answers(machine, query)
        .iter()
        .map(|answer| {
            answer
                .get(name)
                .cloned()
                .unwrap_or_else(|| panic!("{name} is unbound in {answer:?}"))
        })
        .collect()
}

/// Records ports as `port goal` lines.
#[derive(Debug, Default)]
pub(crate) struct RecordingObserver {
    pub(crate) events: Mutex<Vec<String>>,
}

impl Observer for RecordingObserver {
    fn port(&self, event: &PortEvent) {
        self.events
            .lock()
            .push(format!("{} {}", event.port, event.goal));
    }
}
