// Copyright 2017 Dmitry Tantsur <divius.inside@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Various utilities.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

use super::{Error, ErrorKind, Result};

const PASSWORD_GROUPS: [&str; 4] = [
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "abcdefghijklmnopqrstuvwxyz",
    "0123456789",
    "~!@#%^&*_=+-",
];

/// Generate a random resource name.
///
/// The result looks like `<prefix>-<name>-<number>`, empty parts are skipped.
pub fn rand_name<S: AsRef<str>>(name: S, prefix: Option<&str>) -> String {
    let number = rand::thread_rng().gen_range(1..=0x7fff_ffffu32);
    let mut parts = Vec::with_capacity(3);
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        parts.push(prefix.to_string());
    }
    if !name.as_ref().is_empty() {
        parts.push(name.as_ref().to_string());
    }
    parts.push(number.to_string());
    parts.join("-")
}

/// Generate a random password.
///
/// The password contains at least one character of each class (upper case,
/// lower case, digit, punctuation). `length` below 4 is raised to 4.
pub fn rand_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let all: Vec<u8> = PASSWORD_GROUPS.iter().flat_map(|g| g.bytes()).collect();

    let mut result: Vec<u8> = PASSWORD_GROUPS
        .iter()
        .filter_map(|g| g.as_bytes().choose(&mut rng).copied())
        .collect();
    while result.len() < length {
        if let Some(c) = all.choose(&mut rng) {
            result.push(*c);
        }
    }
    result.shuffle(&mut rng);
    result.into_iter().map(char::from).collect()
}

pub mod url {
    //! Handy primitives for working with URLs.

    use reqwest::Url;

    use crate::{Error, ErrorKind, Result};

    /// Parse a URL, converting the error.
    pub fn parse(value: &str) -> Result<Url> {
        Url::parse(value)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("Invalid URL {}: {}", value, e)))
    }

    fn is_version_segment(segment: &str) -> bool {
        let mut rest = match segment.strip_prefix('v') {
            Some(rest) if !rest.is_empty() => rest.splitn(2, '.'),
            _ => return false,
        };
        let major = rest.next().unwrap_or("");
        let minor = rest.next();
        !major.is_empty()
            && major.chars().all(|c| c.is_ascii_digit())
            && minor.map_or(true, |m| !m.is_empty() && m.chars().all(|c| c.is_ascii_digit()))
    }

    /// Replace the API version in the URL path or append one.
    pub fn replace_version(url: &str, new_version: &str) -> Result<String> {
        let mut parsed = parse(url)?;
        let segments: Vec<String> = parsed
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        let mut replaced = false;
        let mut new_segments = Vec::with_capacity(segments.len() + 1);
        for segment in segments {
            if !replaced && is_version_segment(&segment) {
                new_segments.push(new_version.to_string());
                replaced = true;
            } else {
                new_segments.push(segment);
            }
        }
        if !replaced {
            new_segments.push(new_version.to_string());
        }
        parsed.set_path(&format!("/{}", new_segments.join("/")));
        Ok(parsed.to_string())
    }

    /// Join a base URL with a relative path, collapsing duplicate slashes.
    pub fn join(base: &str, path: &str) -> Result<String> {
        if path.is_empty() {
            return Ok(base.to_string());
        }

        let mut parsed = parse(&format!("{}/{}", base, path))?;
        let mut collapsed = String::with_capacity(parsed.path().len());
        let mut previous_slash = false;
        for c in parsed.path().chars() {
            if c == '/' {
                if previous_slash {
                    continue;
                }
                previous_slash = true;
            } else {
                previous_slash = false;
            }
            collapsed.push(c);
        }
        parsed.set_path(&collapsed);
        Ok(parsed.to_string())
    }

    /// Drop the path component of a URL.
    pub fn strip_path(url: &str) -> Result<String> {
        let mut parsed = parse(url)?;
        parsed.set_path("/");
        Ok(parsed.to_string())
    }
}

/// An exclusive inter-process lock held on a file.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct ExternalLock {
    file: File,
    path: PathBuf,
}

impl ExternalLock {
    /// Acquire a named lock in the given directory, blocking until it is free.
    pub fn acquire<P: AsRef<Path>>(lock_path: P, name: &str) -> Result<ExternalLock> {
        let lock_path = lock_path.as_ref();
        fs::create_dir_all(lock_path).map_err(|e| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Cannot create lock directory {}: {}", lock_path.display(), e),
            )
        })?;

        let path = lock_path.join(name);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        trace!("Waiting for external lock {}", path.display());
        file.lock()?;
        trace!("Acquired external lock {}", path.display());
        Ok(ExternalLock { file, path })
    }
}

impl Drop for ExternalLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
