//! Client tests against the in-memory chain
