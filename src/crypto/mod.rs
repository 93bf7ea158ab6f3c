mod jwt;
mod key;

pub use jwt::sign;
pub use key::RsaKeyMaterial;
