//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Driving ports ([`ScanCommand`], [`LoyaltyQuery`]) are implemented by domain
//! services. Driven ports ([`ScanStore`], [`IdentityDirectory`],
//! [`LoyaltyQueryRepository`]) are implemented by outbound adapters and raise
//! typed errors so services can map failures predictably.

mod macros;
pub(crate) use macros::define_port_error;

mod identity_directory;
mod loyalty_query;
mod loyalty_query_repository;
mod scan_command;
mod scan_store;

#[cfg(test)]
pub use identity_directory::MockIdentityDirectory;
pub use identity_directory::{
    FixtureIdentityDirectory, IdentityDirectory, IdentityDirectoryError,
};
#[cfg(test)]
pub use loyalty_query::MockLoyaltyQuery;
pub use loyalty_query::LoyaltyQuery;
#[cfg(test)]
pub use loyalty_query_repository::MockLoyaltyQueryRepository;
pub use loyalty_query_repository::{
    ClientProgramRecord, FixtureLoyaltyQueryRepository, LoyaltyQueryRepository,
    LoyaltyQueryRepositoryError,
};
#[cfg(test)]
pub use scan_command::MockScanCommand;
pub use scan_command::{ScanCommand, ScanRequest, ScanResponse, ScanStatus};
pub use scan_store::{ScanStore, ScanStoreError, ScanUnitOfWork};
