//! Argus Collectors
//!
//! Collector plugins behind one capability contract:
//! - **dns**: A/MX/NS resolution (passive)
//! - **whois**: registrar/registrant lookup over TCP/43 (passive)
//! - **geo**: IP geolocation via ip-api.com (passive)
//! - **github**: repository search, optionally authenticated (passive)
//! - **ports**: TCP connect scan (active)
//! - **http**: service discovery - status, headers, title (active)
//! - **screenshot**: headless browser page capture (active)
//! - **social**: username sweep across social platforms (active)
//! - **external**: subprocess plugins discovered by manifest
//!
//! Every network call carries its own timeout; partial results are fine; a
//! collector that finds nothing returns an empty list, not an error.

pub mod archive;
pub mod dns;
pub mod external;
pub mod geoip;
pub mod github;
pub mod http_probe;
pub mod ports;
pub mod screenshot;
pub mod social;
pub mod traits;
pub mod whois;

pub use archive::*;
pub use dns::*;
pub use external::*;
pub use geoip::*;
pub use github::*;
pub use http_probe::*;
pub use ports::*;
pub use screenshot::*;
pub use social::*;
pub use traits::*;
pub use whois::*;
