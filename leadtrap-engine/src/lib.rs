//! leadtrap-engine - Lead Acquisition & Conversation Attribution Engine
//!
//! Acquires property ownership records from a metered data provider without
//! re-purchasing data already held, dispatches templated SMS campaigns, and
//! attributes inbound replies back to the correct lead and campaign.
//!
//! Core pipeline:
//! scan (partition owned vs new, spend nothing) -> enrich (purchase selected
//! identifiers, unlock contact fields only when required) -> dispatch
//! (templated sends with a mandatory inter-send delay) -> inbound attribution
//! (exactly-once reply recording).

pub mod campaign;
pub mod clients;
pub mod contacts;
pub mod criteria;
pub mod db;
pub mod enrich;
pub mod inbound;
pub mod scan;
