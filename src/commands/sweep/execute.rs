use std::error::Error;

use super::SweepCmd;
use crate::commands::Execute;
use crate::database::ErDatabase;
use crate::sync::{check_integrity, SweepReport};

impl Execute for SweepCmd {
    type Output = SweepReport;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>> {
        Ok(check_integrity(db, self.dry_run)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::test_utils::synced_db;
    use rstest::rstest;

    fn orphaned_db() -> ErDatabase {
        let db = synced_db();
        db.insert_object(
            "Genome",
            &Record::new().with("id", "83333.1").with("genus", "Escherichia").with("species", "coli"),
        )
        .unwrap();
        for from in ["83333.1", "gone"] {
            db.insert_object(
                "GenomeHasFeature",
                &Record::new().with("from-link", from).with("to-link", "fig|gone"),
            )
            .unwrap();
        }
        db
    }

    #[rstest]
    fn test_dry_run_counts_only() {
        let db = orphaned_db();
        let report = SweepCmd { dry_run: true }.execute(&db).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.total_removed(), 3);
        let remaining = db.get_count("GenomeHasFeature", "", &[]).unwrap();
        assert_eq!(remaining, 2);
    }

    #[rstest]
    fn test_sweep_removes_orphans() {
        let db = orphaned_db();
        SweepCmd { dry_run: false }.execute(&db).unwrap();
        assert_eq!(db.get_count("GenomeHasFeature", "", &[]).unwrap(), 0);
        let again = SweepCmd { dry_run: false }.execute(&db).unwrap();
        assert_eq!(again.total_removed(), 0);
    }
}
