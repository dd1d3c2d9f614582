// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod config;
pub mod fail;
pub mod instructions;
pub mod logging;
pub mod scheduler;
