use blake2::{Blake2b512, Digest};

use crate::db_types::ReferralCode;

pub const REFERRAL_CODE_LENGTH: usize = 8;

/// Creates a referral code for a partner. The code is the first four bytes of the Blake2b hash of the partner's email
/// and `nonce`, written as upper-case hex.
///
/// The same email and nonce always give the same code, so callers that need a fresh code after a collision just pick
/// another nonce.
pub fn referral_code_for(email: &str, nonce: u64) -> ReferralCode {
    let mut hasher = Blake2b512::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();
    let code = digest[..REFERRAL_CODE_LENGTH / 2].iter().map(|b| format!("{b:02X}")).collect::<String>();
    ReferralCode(code)
}

/// A referral code for `email` with a random nonce.
pub fn new_referral_code(email: &str) -> ReferralCode {
    referral_code_for(email, rand::random::<u64>())
}

/// Lower-cases and trims an email address so that lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A very loose plausibility check. Deliverability is not our problem.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(' ')
        },
        None => false,
    }
}
