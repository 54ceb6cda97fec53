// Entity Models
//
// A registry entity is identified by its SWIFT code. The record and the
// public views the API hands out live together so field renames stay in
// one place.

pub mod swift_code;

pub use swift_code::{
    CountryEntry, CountryListing, NewSwiftCode, SwiftCode, SwiftCodeDetails, SwiftCodeSummary,
    UNKNOWN,
};
