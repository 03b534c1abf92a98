//! Recording pod deleter

use std::io;
use std::sync::Mutex;

use crate::hook::lock;
use crate::kubernetes::{PodDeleteError, PodDeleter};

/// Records every deletion instead of calling the API server
#[derive(Debug, Default)]
pub struct RecordingPodDeleter {
    deletions: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingPodDeleter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every deletion is recorded, then fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(namespace, pod)` pairs in call order
    pub fn deletions(&self) -> Vec<(String, String)> {
        lock(&self.deletions).clone()
    }
}

impl PodDeleter for RecordingPodDeleter {
    fn delete_pod(&self, pod: &str, namespace: &str) -> Result<(), PodDeleteError> {
        lock(&self.deletions).push((namespace.to_string(), pod.to_string()));

        if self.fail {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "api server unreachable").into());
        }
        Ok(())
    }
}
