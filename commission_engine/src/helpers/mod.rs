mod referral_codes;

pub use referral_codes::{
    is_plausible_email,
    new_referral_code,
    normalize_email,
    referral_code_for,
    REFERRAL_CODE_LENGTH,
};
