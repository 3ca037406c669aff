/*!
 * Live cloud providers
 *
 * Only compiled with the `aws-native` feature. Everything above this layer
 * talks to the [`crate::backend`] traits, so tests and offline builds run
 * against in-memory fakes instead.
 */

pub mod aws;
