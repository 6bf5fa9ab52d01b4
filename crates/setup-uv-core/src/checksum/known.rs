// AUTOGENERATED by `setup-uv update-known-checksums`. Do not edit by hand.

use setup_uv_schema::{Arch, Platform};

/// Release checksums keyed by `<arch>-<platform>-<version>`.
pub static KNOWN_CHECKSUMS: &[(&str, &str)] = &[
    (
        "aarch64-apple-darwin-0.9.26",
        "fcf0a9ea6599c6ae28a4c854ac6da76f2c889354d7c36ce136ef071f7ab9721f",
    ),
    (
        "x86_64-pc-windows-msvc-0.9.26",
        "eb02fd95d8e0eed462b4a67ecdd320d865b38c560bffcda9a0b87ec944bdf036",
    ),
    (
        "aarch64-apple-darwin-0.9.25",
        "606b3c6949d971709f2526fa0d9f0fd23ccf60e09f117999b406b424af18a6a6",
    ),
];

/// Composite lookup key for the table.
pub fn checksum_key(arch: Arch, platform: Platform, version: &str) -> String {
    format!("{arch}-{platform}-{version}")
}

pub fn lookup(key: &str) -> Option<&'static str> {
    KNOWN_CHECKSUMS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}
