pub mod draft;
pub mod flow;
pub mod orchestrator;
pub mod persister;
pub mod reference;

pub use draft::{BookingDraft, ContactInput, GuestInfo, Selection};
pub use flow::{BookingFlow, FlowConfig, FlowKind, FlowServices, FlowSnapshot, FlowStep, Session};
pub use orchestrator::{MockPaymentGateway, PaymentCoordinator, PaymentHandoff, SettlementOutcome};
pub use persister::{BookingPersister, CreatedBooking};
pub use reference::{RandomReferences, ReferenceSource};

#[cfg(test)]
mod testkit;
#[cfg(test)]
mod flow_tests;
