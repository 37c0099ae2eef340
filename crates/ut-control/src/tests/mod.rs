//! Behavioural tests for the control plane.

mod lifecycle_behaviour;
