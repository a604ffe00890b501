pub(crate) mod emit;
pub(crate) mod fingerprint;
pub(crate) mod run;
