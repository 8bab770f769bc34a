#![allow(dead_code)]

pub mod command;
pub mod file;

use std::path::Path;

/// Id stored in a ref file such as `refs/heads/master`
pub fn read_ref(dir: &Path, name: &str) -> Option<String> {
    std::fs::read_to_string(dir.join(".twig").join(name))
        .ok()
        .map(|content| content.trim().to_string())
}

/// Raw content of `HEAD`
pub fn read_head(dir: &Path) -> String {
    std::fs::read_to_string(dir.join(".twig").join("HEAD"))
        .expect("Failed to read HEAD")
        .trim()
        .to_string()
}

/// Number of loose objects in the store
pub fn count_objects(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir.join(".twig").join("objects"))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

pub fn object_exists(dir: &Path, oid: &str) -> bool {
    dir.join(".twig")
        .join("objects")
        .join(&oid[..2])
        .join(&oid[2..])
        .is_file()
}
