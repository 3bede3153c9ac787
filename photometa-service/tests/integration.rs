//! Full service lifecycle against a spawned binary.

use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

/// Smallest decodable image: a 1x1 red PNG.
const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
    0x77, 0x53, 0xde, 0x00, 0x00, 0x00, 0x0c, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0xf8,
    0xcf, 0xc0, 0x00, 0x00, 0x03, 0x01, 0x01, 0x00, 0xc9, 0xfe, 0x92, 0xef, 0x00, 0x00, 0x00,
    0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn wait_for_service(base_url: &str, timeout: Duration) -> bool {
    let client = reqwest::blocking::Client::new();
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if client.get(format!("{}/status", base_url)).send().is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

struct ServiceGuard(std::process::Child);

impl Drop for ServiceGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[test]
fn test_service_lifecycle() {
    let library = TempDir::new().unwrap();
    let root = library.path().canonicalize().unwrap();
    let root = root.as_path();
    for name in ["a.png", "b.png", "c.png"] {
        std::fs::write(root.join(name), TINY_PNG).unwrap();
    }

    let port = free_port();
    let base_url = format!("http://127.0.0.1:{}", port);
    let _service = ServiceGuard(
        Command::new(env!("CARGO_BIN_EXE_photometa-service"))
            .args(["--port", &port.to_string()])
            .spawn()
            .expect("Failed to start photometa-service"),
    );
    assert!(
        wait_for_service(&base_url, Duration::from_secs(5)),
        "Service failed to start"
    );

    let client = reqwest::blocking::Client::new();
    let lib_param = root.to_string_lossy().to_string();

    // 1. Scan the fresh library
    let resp: serde_json::Value = client
        .post(format!("{}/scan", base_url))
        .json(&serde_json::json!({ "library": &lib_param }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert!(resp["started"].as_bool().unwrap());
    assert_eq!(resp["total"].as_u64().unwrap(), 3);

    // 2. Wait for the scan to finish
    let mut done = false;
    for _ in 0..50 {
        std::thread::sleep(Duration::from_millis(100));
        let resp: serde_json::Value = client
            .get(format!("{}/scan/status", base_url))
            .query(&[("library", &lib_param)])
            .send()
            .unwrap()
            .json()
            .unwrap();
        if !resp["scanning"].as_bool().unwrap() {
            assert_eq!(resp["processed"].as_u64(), resp["total"].as_u64());
            done = true;
            break;
        }
    }
    assert!(done, "Scan never finished");

    // 3. Plain listing
    let resp: serde_json::Value = client
        .get(format!("{}/images", base_url))
        .query(&[("library", &lib_param)])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(resp["total_count"].as_u64().unwrap(), 3);
    assert_eq!(resp["total_pages"].as_u64().unwrap(), 1);

    // 4. Write a field, then find the file through search
    let image_path = root.join("a.png").to_string_lossy().to_string();
    let resp = client
        .put(format!("{}/metadata", base_url))
        .json(&serde_json::json!({
            "library": &lib_param,
            "path": &image_path,
            "namespace": "iptc",
            "key": "Keywords",
            "values": ["sunset", "beach"],
        }))
        .send()
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["values"].as_array().unwrap().len(), 2);

    let resp: serde_json::Value = client
        .get(format!("{}/images", base_url))
        .query(&[("library", lib_param.as_str()), ("search", "sunset")])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(resp["total_count"].as_u64().unwrap(), 1);
    assert_eq!(resp["files"][0].as_str().unwrap(), image_path);

    // 5. Untagged filter excludes the file just written
    let resp: serde_json::Value = client
        .get(format!("{}/images", base_url))
        .query(&[
            ("library", lib_param.as_str()),
            ("untagged", "true"),
            ("namespace", "iptc"),
            ("field", "Keywords"),
        ])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(resp["total_count"].as_u64().unwrap(), 2);

    // 6. Metadata read shows the stored values
    let resp: serde_json::Value = client
        .get(format!("{}/metadata", base_url))
        .query(&[("library", lib_param.as_str()), ("path", image_path.as_str())])
        .send()
        .unwrap()
        .json()
        .unwrap();
    let keywords = resp["fields"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["key"].as_str() == Some("Keywords"))
        .expect("Keywords field in metadata response");
    assert_eq!(keywords["values"].as_array().unwrap().len(), 2);

    // 7. Tag autocomplete
    let resp: serde_json::Value = client
        .get(format!("{}/tags/search", base_url))
        .query(&[("library", lib_param.as_str()), ("q", "sun")])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(resp.as_array().unwrap().len(), 1);
    assert_eq!(resp[0].as_str().unwrap(), "sunset");

    // 8. Field catalog is static and includes both namespaces
    let resp: serde_json::Value = client
        .get(format!("{}/fields", base_url))
        .send()
        .unwrap()
        .json()
        .unwrap();
    let defs = resp.as_array().unwrap();
    assert!(defs.iter().any(|d| d["namespace"] == "iptc"));
    assert!(defs.iter().any(|d| d["namespace"] == "exif"));

    // 9. Thumbnail renders and comes back as JPEG
    let resp = client
        .get(format!("{}/images/thumbnail", base_url))
        .query(&[("library", lib_param.as_str()), ("path", image_path.as_str())])
        .send()
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    let bytes = resp.bytes().unwrap();
    assert!(bytes.starts_with(&[0xff, 0xd8]), "expected JPEG magic");

    // 10. Unknown field writes are a 400 with an error envelope
    let resp = client
        .put(format!("{}/metadata", base_url))
        .json(&serde_json::json!({
            "library": &lib_param,
            "path": &image_path,
            "namespace": "iptc",
            "key": "Bogus",
            "values": ["x"],
        }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["code"].as_str().unwrap(), "bad_request");

    // 11. Missing file reads are a 404
    let resp = client
        .get(format!("{}/metadata", base_url))
        .query(&[
            ("library", lib_param.as_str()),
            ("path", root.join("gone.png").to_string_lossy().as_ref()),
        ])
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
