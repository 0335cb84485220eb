//! X.509-SVID and JWT-SVID types.

pub mod jwt;
pub mod x509;
