// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::flexi_logger::Logger;
use ::std::sync::Once;

//======================================================================================================================
// Constants
//======================================================================================================================

cfg_if::cfg_if! {
    if #[cfg(debug_assertions)] {
        /// Log specification used when `RUST_LOG` is not set.
        const DEFAULT_LOG_SPEC: &str = "info";
    } else {
        /// Log specification used when `RUST_LOG` is not set.
        const DEFAULT_LOG_SPEC: &str = "warn";
    }
}

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Guardian to the logging initialize function.
static INIT_LOG: Once = Once::new();

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Initializes logging features. The log specification is read from `RUST_LOG`.
pub fn initialize() {
    INIT_LOG.call_once(|| {
        match Logger::try_with_env_or_str(DEFAULT_LOG_SPEC).and_then(|logger| logger.start()) {
            // The handle shuts the logger down when dropped, so it lives for the rest of the process.
            Ok(handle) => ::std::mem::forget(handle),
            Err(e) => eprintln!("initialize(): failed to start logger ({:?})", e),
        }
    });
}
