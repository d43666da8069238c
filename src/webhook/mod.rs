//! Deploy webhooks: payload parsing, signature checks and task correlation.

mod correlator;
mod parser;
mod signature;

pub use correlator::correlate;
pub use parser::{parse_custom, parse_netlify, parse_vercel, parse_webhook, DeployEvent};
pub use signature::{sign, signature_from_headers, verify_signature, SIGNATURE_HEADERS};
