//! Booking lifecycle: creation, payment, activation, completion,
//! cancellation.

pub mod lifecycle;
pub mod payment;

pub use lifecycle::{BookingLifecycleManager, BookingPolicy, BookingRequest};
pub use payment::{PaymentGateway, PaymentSession, PaymentVerification, SandboxGateway};
