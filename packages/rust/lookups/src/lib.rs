//! Small single-call lookups: the mobile-friendly test and MX-based
//! email provider detection.

pub mod email_provider;
pub mod mobile;

pub use email_provider::{
    DnsResolver, EmailProviders, MxError, MxRecord, MxResolver, email_provider_row,
    get_email_provider, provider_for,
};
pub use mobile::{MobileFriendlyClient, mobile_row};
