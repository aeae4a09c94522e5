//! Test doubles shared by the infrastructure unit tests.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_test::io::Mock;

use super::link::Connector;

/// Hands out pre-built mock streams in order; refuses once exhausted.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    script: Mutex<VecDeque<io::Result<Mock>>>,
    pub(crate) attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub(crate) fn new(script: Vec<io::Result<Mock>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Stream = Mock;

    async fn connect(&self) -> io::Result<Mock> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::ConnectionRefused.into()))
    }

    fn endpoint(&self) -> String {
        "scripted".to_string()
    }
}
