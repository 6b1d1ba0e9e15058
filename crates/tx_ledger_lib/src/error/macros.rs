/// Wrap any error convertible into `ErrorBag`, usage: `.map_err(err_from!())`
#[macro_export]
macro_rules! err_from {
    () => {
        |e| $crate::error::TrackerError {
            inner: $crate::error::ErrorBag::from(e),
            msg: None,
            file: file!(),
            line: line!(),
        }
    };
}

/// Create error from a value convertible into `ErrorBag`
#[macro_export]
macro_rules! err_create {
    ($t:expr) => {
        $crate::error::TrackerError {
            inner: $crate::error::ErrorBag::from($t),
            msg: None,
            file: file!(),
            line: line!(),
        }
    };
}

/// Create error with formatted message
#[macro_export]
macro_rules! err_custom_create {
    ($($t:tt)*) => {
        $crate::error::TrackerError {
            inner: $crate::error::ErrorBag::CustomError($crate::error::CustomError::new(&format!($($t)*))),
            msg: None,
            file: file!(),
            line: line!(),
        }
    };
}
