use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::model::AdRecord;

/// Column order of the record file. Matches the serde names on `AdRecord`.
pub const HEADER: [&str; 8] = [
    "site", "model", "prix", "contact", "lien", "telephone", "date", "image",
];

const DELIMITER: u8 = b';';

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on record file: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error on record file: {0}")]
    Csv(#[from] csv::Error),
}

/// Overwrite `path` with a header row plus one row per record, in order.
pub fn write_records(path: &Path, records: &[AdRecord]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .from_path(path)?;
    // Explicit header so an empty run still produces a readable file
    writer.write_record(HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Read a record file back. A missing file means no prior results.
pub fn load_records(path: &Path) -> Result<Vec<AdRecord>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Site;

    fn record(site: Site, link: &str) -> AdRecord {
        AdRecord {
            site,
            model: "Ford Transit".into(),
            price: "120 000 DH".into(),
            contact: "Vendeur".into(),
            link: link.into(),
            phone: "0661223344".into(),
            published: "12-03-2024".into(),
            image: "https://img.ma/1.jpg".into(),
        }
    }

    #[test]
    fn header_and_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annonces.csv");
        write_records(&path, &[record(Site::Avito, "https://www.avito.ma/a.htm")]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("site;model;prix;contact;lien;telephone;date;image")
        );
        assert_eq!(
            lines.next(),
            Some("Avito.ma;Ford Transit;120 000 DH;Vendeur;https://www.avito.ma/a.htm;0661223344;12-03-2024;https://img.ma/1.jpg")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn round_trip_keeps_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annonces.csv");
        let mut sparse = record(Site::Truck1, "https://www.truck1.co.ma/minibus/x.html");
        sparse.contact.clear();
        sparse.image.clear();
        sparse.price.clear();
        let records = vec![
            record(Site::Moteur, "https://www.moteur.ma/fr/detail-annonce/1/x.html"),
            sparse,
            record(Site::MarocUtilitaires, "https://www.maroc-utilitaires.com/a.html"),
        ];

        write_records(&path, &records).unwrap();
        let back = load_records(&path).unwrap();
        assert_eq!(back, records);
        assert_eq!(back[1].contact, "");
        assert_eq!(back[1].image, "");
    }

    #[test]
    fn semicolons_in_fields_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annonces.csv");
        let mut ad = record(Site::Autoline, "https://autoline.co.ma/-/x");
        ad.model = "Sprinter; 20 places".into();
        write_records(&path, &[ad.clone()]).unwrap();
        assert_eq!(load_records(&path).unwrap(), vec![ad]);
    }

    #[test]
    fn rewrite_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annonces.csv");
        let records: Vec<AdRecord> = (0..4)
            .map(|i| record(Site::Moteur, &format!("https://www.moteur.ma/{}", i)))
            .collect();

        write_records(&path, &records).unwrap();
        write_records(&path, &records).unwrap();

        assert_eq!(load_records(&path).unwrap().len(), 4);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn empty_run_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("annonces.csv");
        write_records(&path, &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim_end(),
            HEADER.join(";")
        );
        assert!(load_records(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_no_results() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_records(&dir.path().join("absent.csv")).unwrap().is_empty());
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as the output file
        assert!(write_records(dir.path(), &[]).is_err());
    }
}
