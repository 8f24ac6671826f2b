pub mod delivery;
pub mod producer;
pub mod serializer;

pub use delivery::{DeliveryOutcome, DeliveryReceipt, DeliveryReporter, DeliveryTicket};
pub use producer::{DeliveryRecord, ProducerTemplate};
pub use serializer::Encoding;
