use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn csv_export_writes_sheet_rows_in_roll_order() {
    let workspace = temp_dir("attendd-csv-export");
    let csv_out = workspace.join("section-sheet.csv");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let college = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "colleges.create",
        json!({ "name": "Export College", "code": "EXP" }),
    );
    let department = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "departments.create",
        json!({
            "collegeId": college.get("collegeId").and_then(|v| v.as_str()).expect("collegeId"),
            "name": "ECE",
            "code": "ECE"
        }),
    );
    let year = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "years.create",
        json!({
            "departmentId": department.get("departmentId").and_then(|v| v.as_str()).expect("departmentId"),
            "yearNumber": 1
        }),
    );
    let section = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sections.create",
        json!({
            "yearId": year.get("yearId").and_then(|v| v.as_str()).expect("yearId"),
            "name": "C"
        }),
    );
    let section_id = section
        .get("sectionId")
        .and_then(|v| v.as_str())
        .expect("sectionId")
        .to_string();

    // Created out of roll order on purpose; the export must sort by roll.
    let mut ids = std::collections::HashMap::new();
    for (roll, name) in [("21EC002", "Beena"), ("21EC001", "Arun"), ("21EC003", "Charu")] {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("6-{}", roll),
            "students.create",
            json!({ "sectionId": section_id, "rollNumber": roll, "name": name }),
        );
        ids.insert(
            roll,
            created
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }

    let date = "2025-08-01";
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.save",
        json!({
            "sectionId": section_id,
            "date": date,
            "entries": [
                { "studentId": ids["21EC001"], "status": "present" },
                { "studentId": ids["21EC002"], "status": "absent" },
                { "studentId": ids["21EC003"], "status": "present" }
            ]
        }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.exportCsv",
        json!({
            "sectionId": section_id,
            "date": date,
            "outPath": csv_out.to_string_lossy()
        }),
    );
    assert_eq!(exported.get("rows").and_then(|v| v.as_u64()), Some(3));

    let expected = "S.No,Roll Number,Student Name,Attendance Status\n\
                    1,21EC001,Arun,Present\n\
                    2,21EC002,Beena,Absent\n\
                    3,21EC003,Charu,Present\n";
    assert_eq!(
        exported.get("csv").and_then(|v| v.as_str()),
        Some(expected)
    );
    let on_disk = std::fs::read_to_string(&csv_out).expect("read exported csv");
    assert_eq!(on_disk, expected);

    // Without outPath the csv still comes back inline.
    let inline = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.exportCsv",
        json!({ "sectionId": section_id, "date": date }),
    );
    assert_eq!(inline.get("csv").and_then(|v| v.as_str()), Some(expected));
    assert!(inline.get("outPath").map(|v| v.is_null()).unwrap_or(true));

    let _ = std::fs::remove_dir_all(workspace);
}
