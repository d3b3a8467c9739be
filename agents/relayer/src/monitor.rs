use std::sync::Arc;

use derive_new::new;
use futures::future::join_all;
use tracing::{error, info, info_span, Instrument};

use crate::processor::{Processor, ProcessorError};

/// Starts and stops a set of independent processors as one unit
#[derive(Debug, new)]
pub struct Monitor {
    processors: Vec<Arc<dyn Processor>>,
}

impl Monitor {
    /// Run every processor on its own task and wait for all of them to
    /// return. Fails with the first processor error.
    pub async fn start(&self) -> Result<(), ProcessorError> {
        info!(processors = self.processors.len(), "starting processors");
        let tasks = self.processors.iter().cloned().map(|processor| {
            let span = info_span!("processor", name = processor.name());
            tokio::spawn(async move { processor.start().await }.instrument(span))
        });
        let results = join_all(tasks).await;

        let mut failure = None;
        for (processor, result) in self.processors.iter().zip(results) {
            let result = result.map_err(ProcessorError::from).and_then(|result| result);
            if let Err(err) = result {
                error!(processor = processor.name(), error = %err, "processor failed");
                failure.get_or_insert(err);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Stop every processor
    pub fn stop(&self) {
        for processor in &self.processors {
            processor.stop();
        }
    }
}
