//! Property tests for the report invariants

mod single_active_loop;
