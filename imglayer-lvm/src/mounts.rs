// SPDX-License-Identifier: GPL-3.0-only

//! `/proc/self/mountinfo` parsing
//!
//! Registry cleanup needs to know where a device-mapper node is
//! mounted, and token lookup needs to resolve a mount point back to its
//! source device. Both are answered from the live mount table.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::Result;

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// One mount table entry: where a source device is mounted.
struct MountEntry {
    source: String,
    target: String,
}

fn parse_entries(input: &str) -> impl Iterator<Item = MountEntry> + '_ {
    input.lines().filter_map(|line| {
        // Optional fields of varying count sit before the " - "
        // separator; the filesystem type and source come after it.
        let (left, right) = line.split_once(" - ")?;
        let target = left.split_whitespace().nth(4)?;
        let source = right.split_whitespace().nth(1)?;
        Some(MountEntry {
            source: unescape_mount_field(source),
            target: unescape_mount_field(target),
        })
    })
}

/// Map every mount source device to its mount target.
///
/// Later entries win when a device is mounted more than once, matching
/// how a sweep unmounts the most recent mount first.
pub fn device_mount_map(input: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for entry in parse_entries(input) {
        map.insert(entry.source, entry.target);
    }
    map
}

/// Resolve the source device of the mount at `target`, if any.
pub fn find_mount_source(input: &str, target: &Path) -> Option<String> {
    parse_entries(input)
        .find(|entry| Path::new(&entry.target) == target)
        .map(|entry| entry.source)
}

/// Read the live mount table.
pub fn read_mountinfo() -> Result<String> {
    Ok(fs::read_to_string(MOUNTINFO_PATH)?)
}

/// Whether `path` is a live mount point.
pub fn is_mount_point(path: &Path) -> bool {
    let Ok(input) = read_mountinfo() else {
        return false;
    };
    find_mount_source(&input, path).is_some()
}

fn unescape_mount_field(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 3 < bytes.len()
            && bytes[index + 1].is_ascii_digit()
            && bytes[index + 2].is_ascii_digit()
            && bytes[index + 3].is_ascii_digit()
        {
            let octal = &value[index + 1..index + 4];
            if let Ok(num) = u8::from_str_radix(octal, 8) {
                output.push(num as char);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index] as char);
        index += 1;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
36 25 8:2 / / rw,relatime - ext4 /dev/nvme0n1p2 rw
48 25 253:3 / /run/imglayer/new shared:1 - ext4 /dev/mapper/HostVG-Base--1 rw
49 25 253:4 / /mnt/with\\040space rw - ext4 /dev/mapper/HostVG-Scratch rw
37 25 0:5 / /proc rw,nosuid,nodev,noexec,relatime - proc proc rw
";

    #[test]
    fn maps_sources_to_targets() {
        let map = device_mount_map(SAMPLE);
        assert_eq!(
            map.get("/dev/mapper/HostVG-Base--1").map(String::as_str),
            Some("/run/imglayer/new")
        );
        assert_eq!(
            map.get("/dev/mapper/HostVG-Scratch").map(String::as_str),
            Some("/mnt/with space")
        );
        assert_eq!(map.get("/dev/nvme0n1p2").map(String::as_str), Some("/"));
    }

    #[test]
    fn finds_mount_source_by_target() {
        let source = find_mount_source(SAMPLE, Path::new("/run/imglayer/new"));
        assert_eq!(source.as_deref(), Some("/dev/mapper/HostVG-Base--1"));
        assert!(find_mount_source(SAMPLE, Path::new("/nowhere")).is_none());
    }

    #[test]
    fn last_mount_of_a_device_wins() {
        let sample = "\
36 25 253:3 / /a rw - ext4 /dev/mapper/x rw
37 25 253:3 / /b rw - ext4 /dev/mapper/x rw
";
        let map = device_mount_map(sample);
        assert_eq!(map.get("/dev/mapper/x").map(String::as_str), Some("/b"));
    }
}
