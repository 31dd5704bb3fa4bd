//! External capabilities consulted while processing a payment.

pub mod fraud;
pub mod gateway;

pub use fraud::{FraudCheck, FraudCheckError, RuleBasedFraudCheck, StaticFraudCheck};
pub use gateway::{ChargeOutcome, GatewayError, InMemoryPaymentGateway, PaymentGateway};
