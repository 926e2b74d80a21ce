#![allow(unused_macros)]

macro_rules! trace {
    ($($t:tt)*) => {
        log_shim!(trace, $($t)*)
    }
}

macro_rules! debug {
    ($($t:tt)*) => {
        log_shim!(debug, $($t)*)
    }
}

macro_rules! info {
    ($($t:tt)*) => {
        log_shim!(info, $($t)*)
    }
}

macro_rules! warn {
    ($($t:tt)*) => {
        log_shim!(warn, $($t)*)
    }
}

macro_rules! error {
    ($($t:tt)*) => {
        log_shim!(error, $($t)*)
    }
}

macro_rules! log_shim {
    ($level: ident, $($t:tt)*) => {{
        #[cfg(feature = "log")]
        { log::$level!($($t)*) }
        // Silence unused variables warnings.
        #[cfg(not(feature = "log"))]
        { if false { let _ = ( $($t)* ); } }
    }}
}
