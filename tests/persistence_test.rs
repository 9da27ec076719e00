#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

const HEADER: &str = "type,caller,target,amount,admin_fee,interest,tenor,detail,reference";

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: onboard and originate
    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "{HEADER}").unwrap();
    writeln!(csv1, "register, 7, , , , , , borrower, Budi").unwrap();
    writeln!(csv1, "activate, 7").unwrap();
    writeln!(csv1, "originate, 7, , 300000, 0, 0, 3, Honda Beat, KTR-1").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("credit-ledger"));
    cmd1.arg(csv1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("7,3,200000,500000"));
    assert!(stdout1.contains("1,7,3,active,100000,0"));

    // 2. Second run: pay off the loan recorded by the first run
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "{HEADER}").unwrap();
    for installment in 1..=3 {
        writeln!(csv2, "pay, 7, {installment}, 100000, , , , transfer").unwrap();
    }
    writeln!(csv2, "originate, 7, , 50000, 0, 0, 1, Helmet, KTR-2").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("credit-ledger"));
    cmd2.arg(csv2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    // Limit restored by completion, then debited by the new loan; ids keep counting.
    assert!(stdout2.contains("1,7,3,paid,100000,3"));
    assert!(stdout2.contains("2,7,1,active,50000,0"));
    assert!(stdout2.contains("7,3,450000,500000"));
}
