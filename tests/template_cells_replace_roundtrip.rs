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

#[test]
fn saving_a_template_fully_replaces_its_cell_set() {
    let workspace = temp_dir("attendd-template-replace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "templates.save",
        json!({
            "name": "CS-A Daily",
            "cells": [
                { "rowIndex": 0, "colIndex": 0, "cellType": "header", "label": "Roll" },
                { "rowIndex": 0, "colIndex": 1, "cellType": "header", "label": "Name" },
                { "rowIndex": 0, "colIndex": 2, "cellType": "header", "label": "Present" },
                { "rowIndex": 1, "colIndex": 0, "cellType": "text", "label": "Roll Number" },
                { "rowIndex": 1, "colIndex": 1, "cellType": "text", "label": "Student Name" },
                { "rowIndex": 1, "colIndex": 2, "cellType": "checkbox", "label": "" }
            ]
        }),
    );
    let template_id = saved
        .get("templateId")
        .and_then(|v| v.as_str())
        .expect("templateId")
        .to_string();
    assert_eq!(saved.get("cellCount").and_then(|v| v.as_u64()), Some(6));

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "templates.get",
        json!({ "templateId": template_id }),
    );
    let cells = got.get("cells").and_then(|v| v.as_array()).expect("cells");
    assert_eq!(cells.len(), 6);
    // Stored cells come back with synthesized ids and anchor order.
    assert!(cells
        .iter()
        .all(|c| !c.get("id").and_then(|v| v.as_str()).unwrap_or("").is_empty()));
    assert_eq!(
        cells[0].get("cellType").and_then(|v| v.as_str()),
        Some("header")
    );
    assert_eq!(got.get("maxRow").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(got.get("maxCol").and_then(|v| v.as_i64()), Some(3));

    // A second save under the same id is a replace, not an append.
    let resaved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "templates.save",
        json!({
            "templateId": template_id,
            "name": "CS-A Daily v2",
            "cells": [
                { "rowIndex": 0, "colIndex": 0, "cellType": "header", "label": "Roll", "colspan": 2 },
                { "rowIndex": 1, "colIndex": 0, "cellType": "text", "label": "Roll Number" }
            ]
        }),
    );
    assert_eq!(
        resaved.get("templateId").and_then(|v| v.as_str()),
        Some(template_id.as_str())
    );
    let got2 = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "templates.get",
        json!({ "templateId": template_id }),
    );
    let cells2 = got2.get("cells").and_then(|v| v.as_array()).expect("cells");
    assert_eq!(cells2.len(), 2);
    assert_eq!(
        got2.get("template")
            .and_then(|t| t.get("name"))
            .and_then(|v| v.as_str()),
        Some("CS-A Daily v2")
    );
    assert_eq!(cells2[0].get("colspan").and_then(|v| v.as_i64()), Some(2));

    let listed = request_ok(&mut stdin, &mut reader, "6", "templates.list", json!({}));
    assert_eq!(
        listed
            .get("templates")
            .and_then(|v| v.as_array())
            .map(|v| v.len()),
        Some(1)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "templates.delete",
        json!({ "templateId": template_id }),
    );
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "8",
        "templates.get",
        json!({ "templateId": template_id }),
    );
    assert_eq!(code, "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn template_save_validates_name_and_disjointness() {
    let workspace = temp_dir("attendd-template-validate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "2",
        "templates.save",
        json!({ "name": "   ", "cells": [] }),
    );
    assert_eq!(code, "bad_params");

    // (0,0) spanning 2x2 collides with the cell anchored at (1,1).
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "templates.save",
        json!({
            "name": "Colliding",
            "cells": [
                { "rowIndex": 0, "colIndex": 0, "rowspan": 2, "colspan": 2, "cellType": "header", "label": "Big" },
                { "rowIndex": 1, "colIndex": 1, "cellType": "text", "label": "Inside" }
            ]
        }),
    );
    assert_eq!(code, "overlap");

    // Nothing was persisted by the rejected saves.
    let listed = request_ok(&mut stdin, &mut reader, "4", "templates.list", json!({}));
    assert_eq!(
        listed
            .get("templates")
            .and_then(|v| v.as_array())
            .map(|v| v.len()),
        Some(0)
    );

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "5",
        "templates.save",
        json!({
            "name": "Bad spans",
            "cells": [
                { "rowIndex": 0, "colIndex": 0, "rowspan": 0, "cellType": "text", "label": "" }
            ]
        }),
    );
    assert_eq!(code, "bad_params");

    let _ = std::fs::remove_dir_all(workspace);
}
