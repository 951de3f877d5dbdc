// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

mod util;
pub use util::*;

mod mechs;
