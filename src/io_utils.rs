use std::path::Path;

/// Extracts the library identifier from a read file path by removing common
/// sequence-file extensions.
pub fn library_id_from_filename(read_file: &Path) -> String {
    let mut library_id = read_file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    if library_id.ends_with(".gz") {
        library_id = library_id.replace(".gz", "");
    }

    for extension in [".fastq", ".fq", ".fasta", ".fa", ".fna"] {
        if library_id.ends_with(extension) {
            library_id = library_id.replace(extension, "");
            break;
        }
    }

    library_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_library_id_from_filename() {
        assert_eq!(library_id_from_filename(&PathBuf::from("/data/LIB1.fastq.gz")), "LIB1");
        assert_eq!(library_id_from_filename(&PathBuf::from("LIB2.fq")), "LIB2");
        assert_eq!(library_id_from_filename(&PathBuf::from("LIB3.fasta")), "LIB3");
        assert_eq!(library_id_from_filename(&PathBuf::from("LIB4")), "LIB4");
    }
}
