//! Command-line entry points.

use clap::Args;
use futures::StreamExt as _;

use crate::{async_utils::BoxedStream, prelude::*};

pub mod map;
pub mod schema;

/// Common options for subcommands that process data streams.
#[derive(Debug, Clone, Args)]
pub struct StreamOpts {
    /// Limit processing to the first N records.
    #[clap(long)]
    pub take_first: Option<usize>,

    /// Max number of documents to process at a time. Defaults to the number
    /// of CPUs.
    #[clap(short = 'j', long = "jobs")]
    pub job_count: Option<usize>,

    /// What portion of inputs should we allow to fail? Specified as a
    /// number between 0.0 and 1.0.
    #[clap(long, default_value = "0.01")]
    pub allowed_failure_rate: f32,
}

impl StreamOpts {
    /// How many documents should we process at once?
    pub fn job_count(&self) -> usize {
        self.job_count.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Apply any necessary stream opts to our input stream.
    pub fn apply_stream_input_opts<T>(
        &self,
        input: BoxedStream<Result<T>>,
    ) -> BoxedStream<Result<T>>
    where
        T: 'static,
    {
        if let Some(take_first) = self.take_first {
            input.take(take_first).boxed()
        } else {
            input
        }
    }

    /// Apply `--take-first` to a record count, if we have one.
    pub fn apply_len_opts(&self, len: Option<usize>) -> Option<usize> {
        match (len, self.take_first) {
            (Some(len), Some(take_first)) => Some(len.min(take_first)),
            (len, _) => len,
        }
    }
}
