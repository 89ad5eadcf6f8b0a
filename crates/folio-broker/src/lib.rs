//! Brokerage reads and upstream data providers.
//!
//! - [`client`]: authenticated REST client and the brokerage success rule
//! - [`credential`]: bearer token supply with an explicitly owned cache
//! - [`account`]: portfolio, sellable quantity, buyable amount, volume ratio
//! - [`signals`]: concurrent signal provider reads
//! - [`candidates`]: candidate tickers and prices for the universe
//! - [`advisor`]: optional external decision advisor

pub mod account;
pub mod advisor;
pub mod candidates;
pub mod client;
pub mod credential;
pub mod error;
pub mod signals;

pub use account::{
    parse_balance, AccountReader, BrokerAccountReader, BuyableAmount, DynAccountReader,
    MockAccountReader,
};
pub use advisor::{AdvisorConfig, AdvisorSource, DynAdvisorSource, HttpAdvisorSource, MockAdvisorSource};
pub use candidates::{
    Candidate, CandidateSource, CandidatesConfig, DynCandidateSource, HttpCandidateSource,
    MockCandidateSource,
};
pub use client::{check_response, AccountCredentials, BrokerClient, BrokerConfig};
pub use credential::{
    AuthConfig, Credential, CredentialCache, CredentialProvider, DynCredentialProvider,
    HttpCredentialProvider, StaticCredentialProvider,
};
pub use error::{BrokerError, BrokerResult};
pub use signals::{DynSignalSource, HttpSignalSource, MockSignalSource, SignalSource, SignalsConfig};
