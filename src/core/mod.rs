use rand::distr::{Alphanumeric, SampleString};

pub mod abort;

pub mod channel;

pub mod consumer;

pub mod item;

pub mod pipeline;

pub mod producer;

pub mod record;

/// Generates a random name consisting of alphanumeric characters.
///
/// # Returns
///
/// A `String` containing the generated random name.
fn build_name() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8)
}
