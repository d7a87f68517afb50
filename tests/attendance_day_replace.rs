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

fn raw_request(
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
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = raw_request(stdin, reader, id, method, params);
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

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = raw_request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

/// college -> department -> year -> section with three students; returns
/// (section_id, [student ids in roll order]).
fn seed_section(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
) -> (String, Vec<String>) {
    let college = request_ok(
        stdin,
        reader,
        "s1",
        "colleges.create",
        json!({ "name": "Test College", "code": "TST" }),
    );
    let college_id = college.get("collegeId").and_then(|v| v.as_str()).expect("collegeId");
    let department = request_ok(
        stdin,
        reader,
        "s2",
        "departments.create",
        json!({ "collegeId": college_id, "name": "CSE", "code": "CSE" }),
    );
    let department_id = department
        .get("departmentId")
        .and_then(|v| v.as_str())
        .expect("departmentId");
    let year = request_ok(
        stdin,
        reader,
        "s3",
        "years.create",
        json!({ "departmentId": department_id, "yearNumber": 3 }),
    );
    let year_id = year.get("yearId").and_then(|v| v.as_str()).expect("yearId");
    let section = request_ok(
        stdin,
        reader,
        "s4",
        "sections.create",
        json!({ "yearId": year_id, "name": "B" }),
    );
    let section_id = section
        .get("sectionId")
        .and_then(|v| v.as_str())
        .expect("sectionId")
        .to_string();

    let mut student_ids = Vec::new();
    for (i, name) in ["Anil", "Bhavna", "Chitra"].iter().enumerate() {
        let created = request_ok(
            stdin,
            reader,
            &format!("s5-{}", i),
            "students.create",
            json!({
                "sectionId": section_id,
                "rollNumber": format!("21CS00{}", i + 1),
                "name": name,
            }),
        );
        student_ids.push(
            created
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }
    (section_id, student_ids)
}

fn statuses_by_student(sheet: &serde_json::Value) -> Vec<(String, String)> {
    sheet
        .get("entries")
        .and_then(|v| v.as_array())
        .expect("entries")
        .iter()
        .map(|e| {
            (
                e.get("studentId").and_then(|v| v.as_str()).expect("studentId").to_string(),
                e.get("status").and_then(|v| v.as_str()).expect("status").to_string(),
            )
        })
        .collect()
}

#[test]
fn sheet_seeds_present_and_save_replaces_the_day_slice() {
    let workspace = temp_dir("attendd-day-replace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.setUser",
        json!({ "userId": "teacher-1" }),
    );
    let (section_id, students) = seed_section(&mut stdin, &mut reader);
    let date = "2025-07-14";

    // Nothing persisted yet: every roster student defaults to present.
    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.sheetOpen",
        json!({ "sectionId": section_id, "date": date }),
    );
    let entries = statuses_by_student(&sheet);
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|(_, status)| status == "present"));
    assert_eq!(
        sheet.get("stats"),
        Some(&json!({ "total": 3, "present": 3, "absent": 0 }))
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.save",
        json!({
            "sectionId": section_id,
            "date": date,
            "entries": [
                { "studentId": students[0], "status": "present" },
                { "studentId": students[1], "status": "absent" },
                { "studentId": students[2], "status": "absent" }
            ]
        }),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(3));

    let sheet2 = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.sheetOpen",
        json!({ "sectionId": section_id, "date": date }),
    );
    let entries2 = statuses_by_student(&sheet2);
    assert_eq!(entries2[0], (students[0].clone(), "present".to_string()));
    assert_eq!(entries2[1], (students[1].clone(), "absent".to_string()));
    assert_eq!(entries2[2], (students[2].clone(), "absent".to_string()));
    // Persisted rows carry their row ids back into the sheet.
    assert!(sheet2
        .get("entries")
        .and_then(|v| v.as_array())
        .expect("entries")
        .iter()
        .all(|e| e.get("id").and_then(|v| v.as_str()).is_some()));

    // Resubmitting only one entry removes the other rows; the unsaved
    // students fall back to the seeded default on the next open.
    let saved2 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.save",
        json!({
            "sectionId": section_id,
            "date": date,
            "entries": [{ "studentId": students[1], "status": "absent" }]
        }),
    );
    assert_eq!(saved2.get("saved").and_then(|v| v.as_u64()), Some(1));
    let sheet3 = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.sheetOpen",
        json!({ "sectionId": section_id, "date": date }),
    );
    let entries3 = statuses_by_student(&sheet3);
    assert_eq!(entries3[0].1, "present");
    assert_eq!(entries3[1].1, "absent");
    assert_eq!(entries3[2].1, "present");
    assert_eq!(
        sheet3.get("stats"),
        Some(&json!({ "total": 3, "present": 2, "absent": 1 }))
    );

    // A different date is an independent slice.
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.sheetOpen",
        json!({ "sectionId": section_id, "date": "2025-07-15" }),
    );
    assert!(statuses_by_student(&other)
        .iter()
        .all(|(_, status)| status == "present"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sheet_operations_reject_bad_section_ids_and_statuses() {
    let workspace = temp_dir("attendd-day-validate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (section_id, students) = seed_section(&mut stdin, &mut reader);

    // Router placeholder that never got substituted by the frontend.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.sheetOpen",
        json!({ "sectionId": ":sectionId" }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.sheetOpen",
        json!({ "sectionId": "not-a-uuid" }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.sheetOpen",
        json!({ "sectionId": "00000000-0000-4000-8000-000000000000" }),
    );
    assert_eq!(code, "not_found");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.save",
        json!({
            "sectionId": section_id,
            "date": "2025-07-14",
            "entries": [{ "studentId": students[0], "status": "late" }]
        }),
    );
    assert_eq!(code, "bad_params");

    // The rejected save left no partial rows behind.
    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.sheetOpen",
        json!({ "sectionId": section_id, "date": "2025-07-14" }),
    );
    assert!(sheet
        .get("entries")
        .and_then(|v| v.as_array())
        .expect("entries")
        .iter()
        .all(|e| e.get("id").is_none()));

    let _ = std::fs::remove_dir_all(workspace);
}
