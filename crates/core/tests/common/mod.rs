#![allow(dead_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, payload) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(payload).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// Entries of an archive in stored order.
pub fn read_jar(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut payload = Vec::new();
            file.read_to_end(&mut payload).unwrap();
            (file.name().to_string(), payload)
        })
        .collect()
}

pub fn entry<'a>(entries: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a [u8]> {
    entries
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, payload)| payload.as_slice())
}

fn utf8(pool: &mut Vec<u8>, value: &str) {
    pool.push(1);
    pool.extend_from_slice(&(value.len() as u16).to_be_bytes());
    pool.extend_from_slice(value.as_bytes());
}

/// A minimal class file: `this_class extends java/lang/Object` with one
/// private field of type `field_descriptor` and one string constant.
pub fn class_bytes(this_class: &str, field_descriptor: &str, literal: &str) -> Vec<u8> {
    let mut class = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
    class.extend_from_slice(&9u16.to_be_bytes());
    class.extend_from_slice(&[7, 0, 2]); // #1 Class #2
    utf8(&mut class, this_class); // #2
    class.extend_from_slice(&[7, 0, 4]); // #3 Class #4
    utf8(&mut class, "java/lang/Object"); // #4
    utf8(&mut class, "helper"); // #5
    utf8(&mut class, field_descriptor); // #6
    class.extend_from_slice(&[8, 0, 8]); // #7 String #8
    utf8(&mut class, literal); // #8

    class.extend_from_slice(&[0x00, 0x21]); // public super
    class.extend_from_slice(&[0, 1, 0, 3]); // this, super
    class.extend_from_slice(&[0, 0]); // interfaces
    class.extend_from_slice(&[0, 1, 0x00, 0x02, 0, 5, 0, 6, 0, 0]); // one private field
    class.extend_from_slice(&[0, 0]); // methods
    class.extend_from_slice(&[0, 0]); // attributes
    class
}
