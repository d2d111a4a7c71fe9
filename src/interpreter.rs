mod eval;
mod verify;

pub use self::eval::{
    eval_script, CheckMultiSigError, CheckSigError, SignatureEncodingError, WithdrawError,
};
pub use self::verify::verify_script;
