// daemon
macro_rules! dlog {
    ($log:expr, $level:ident, $msg:expr, $($args:expr),*) => {
        slog::$level!($log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_BMFD,
            "unit" => crate::UNIT_DAEMON,
        )
    };
    ($log:expr, $level:ident, $msg:expr) => {
        slog::$level!($log,
            $msg;
            "component" => crate::COMPONENT_BMFD,
            "unit" => crate::UNIT_DAEMON
        )
    };
}

pub(crate) use dlog;
