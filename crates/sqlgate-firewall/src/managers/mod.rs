//! Built-in firewall managers.

mod banned;
mod basic;
mod composed;
mod csv_rules;
mod injection;
mod lists;
mod remote;

pub use banned::DenyBannedUser;
pub use basic::{
    AllowAll, DenyComments, DenyDatabaseWrite, DenyKinds, DenyMetadataQuery,
    DenyMultipleStatements, DenyStatementClass,
};
pub use composed::{ComposedManager, ExtraRule};
pub use csv_rules::{CsvRules, CsvRulesManager, TableRule};
pub use injection::{DenySqlInjection, InjectionDetector, InspectionMode};
pub use lists::{DenyExceptOnWhitelist, DenyOnBlacklist, StatementList};
pub use remote::DenySqlInjectionRemote;
