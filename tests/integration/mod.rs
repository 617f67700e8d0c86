//! Integration Tests Module
//!
//! End-to-end tests of the diagnostic engine against a scripted in-memory
//! provider: fan-out, the validate-and-retry loop, document consolidation,
//! synthesis, triage, cancellation, usage reporting and settings loading.


// Fan-out cardinality, ordering, isolation and timeouts
mod fan_out_test;

// Critic review and bounded regeneration
mod retry_test;

// Full pipeline: documents, synthesis, triage, cancellation, usage
mod pipeline_test;

// Settings files and engine construction
mod settings_test;
