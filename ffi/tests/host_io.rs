//! Drive the C ABI the way a native host would: build a request through
//! `netkit_build_*`, execute it with ureq against the mock server, and hand
//! the response back to `netkit_parse_response`.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::sync::atomic::{AtomicUsize, Ordering};

use netkit_ffi::types::{
    FfiApiResult, FfiErrorCode, FfiHttpMethod, FfiHttpRequest, FfiHttpResponse, FfiMediaKind,
    FfiNetClient,
};
use netkit_ffi::*;

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
    });

    format!("http://{addr}")
}

fn read_c(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string()
}

/// Execute a request described by the FFI layer; returns status and body.
fn execute(req: *mut FfiHttpRequest) -> (u16, Vec<u8>) {
    assert!(!req.is_null());
    let r = unsafe { &*req };
    let url = read_c(r.url);
    let headers: Vec<(String, String)> =
        unsafe { std::slice::from_raw_parts(r.headers, r.headers_len as usize) }
            .iter()
            .map(|h| (read_c(h.key), read_c(h.value)))
            .collect();
    let body = if r.body.is_null() {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(r.body, r.body_len) }.to_vec()
    };

    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent();

    macro_rules! with_headers {
        ($builder:expr) => {{
            let mut b = $builder;
            for (k, v) in &headers {
                b = b.header(k.as_str(), v.as_str());
            }
            b
        }};
    }

    let mut response = match r.method {
        FfiHttpMethod::Get => with_headers!(agent.get(&url)).call(),
        FfiHttpMethod::Delete => with_headers!(agent.delete(&url)).call(),
        FfiHttpMethod::Post => with_headers!(agent.post(&url)).send(body.as_slice()),
        FfiHttpMethod::Put => with_headers!(agent.put(&url)).send(body.as_slice()),
    }
    .expect("HTTP transport error");
    netkit_free_request(req);

    let status = response.status().as_u16();
    (status, response.body_mut().read_to_vec().unwrap_or_default())
}

fn parse(client: *mut FfiNetClient, status: u16, body: &[u8]) -> *mut FfiApiResult {
    let resp = FfiHttpResponse {
        status,
        body: body.as_ptr(),
        body_len: body.len(),
    };
    netkit_parse_response(client, &resp)
}

fn result_json(result: *mut FfiApiResult) -> serde_json::Value {
    let r = unsafe { &*result };
    assert_eq!(r.error_code, FfiErrorCode::Ok);
    let body = unsafe { std::slice::from_raw_parts(r.body, r.body_len) };
    let json = serde_json::from_slice(body).unwrap();
    netkit_free_result(result);
    json
}

#[test]
fn create_fetch_and_delete_user() {
    let url = CString::new(start_server()).unwrap();
    let client = netkit_client_new(url.as_ptr(), std::ptr::null());

    let path = CString::new("/users").unwrap();
    let body = CString::new(r#"{"firstName":"Ann","email":"ann@example.com"}"#).unwrap();
    let (status, bytes) = execute(netkit_build_request(
        client,
        FfiHttpMethod::Post,
        path.as_ptr(),
        body.as_ptr(),
    ));
    assert_eq!(status, 201);
    let created = result_json(parse(client, status, &bytes));
    assert_eq!(created["firstName"], "Ann");
    let id = created["id"].as_str().unwrap().to_string();

    let user_path = CString::new(format!("/users/{id}")).unwrap();
    let (status, bytes) = execute(netkit_build_request(
        client,
        FfiHttpMethod::Get,
        user_path.as_ptr(),
        std::ptr::null(),
    ));
    let fetched = result_json(parse(client, status, &bytes));
    assert_eq!(fetched, created);

    let (status, bytes) = execute(netkit_build_request(
        client,
        FfiHttpMethod::Delete,
        user_path.as_ptr(),
        std::ptr::null(),
    ));
    assert_eq!(status, 204);
    assert!(result_json(parse(client, status, &bytes)).is_null());

    netkit_client_free(client);
}

#[test]
fn validation_error_carries_server_body() {
    let url = CString::new(start_server()).unwrap();
    let client = netkit_client_new(url.as_ptr(), std::ptr::null());

    let path = CString::new("/users").unwrap();
    let body = CString::new(r#"{"firstName":"Ann","email":""}"#).unwrap();
    let (status, bytes) = execute(netkit_build_request(
        client,
        FfiHttpMethod::Post,
        path.as_ptr(),
        body.as_ptr(),
    ));
    let result = parse(client, status, &bytes);
    let r = unsafe { &*result };
    assert_eq!(r.error_code, FfiErrorCode::Validation);
    let raw = unsafe { std::slice::from_raw_parts(r.body, r.body_len) };
    let json: serde_json::Value = serde_json::from_slice(raw).unwrap();
    assert_eq!(json["errors"]["email"][0], "can't be blank");

    netkit_free_result(result);
    netkit_client_free(client);
}

static UNAUTHORIZED: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_unauthorized(_user_data: *mut c_void) {
    UNAUTHORIZED.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn unauthorized_then_token_refresh() {
    let url = CString::new(start_server()).unwrap();
    let client = netkit_client_new(url.as_ptr(), std::ptr::null());
    assert!(netkit_set_unauthorized_callback(
        client,
        Some(on_unauthorized),
        std::ptr::null_mut(),
    ));

    let me = CString::new("/me").unwrap();
    let (status, bytes) = execute(netkit_build_request(
        client,
        FfiHttpMethod::Get,
        me.as_ptr(),
        std::ptr::null(),
    ));
    assert_eq!(status, 401);
    let result = parse(client, status, &bytes);
    assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::Unauthorized);
    assert_eq!(UNAUTHORIZED.load(Ordering::SeqCst), 1);
    netkit_free_result(result);

    let token = CString::new(mock_server::DEFAULT_TOKEN).unwrap();
    assert!(netkit_client_set_token(client, token.as_ptr()));
    let (status, bytes) = execute(netkit_build_request(
        client,
        FfiHttpMethod::Get,
        me.as_ptr(),
        std::ptr::null(),
    ));
    let user = result_json(parse(client, status, &bytes));
    assert_eq!(user["lastName"], "User");
    assert_eq!(UNAUTHORIZED.load(Ordering::SeqCst), 1);

    netkit_client_free(client);
}

#[test]
fn upload_reaches_server_as_multipart() {
    let url = CString::new(start_server()).unwrap();
    let client = netkit_client_new(url.as_ptr(), std::ptr::null());

    let path = CString::new("/uploads").unwrap();
    let field = CString::new("photo").unwrap();
    let data = [1u8, 2, 3, 4, 5, 6];
    let (status, bytes) = execute(netkit_build_upload(
        client,
        path.as_ptr(),
        field.as_ptr(),
        FfiMediaKind::Png,
        data.as_ptr(),
        data.len(),
    ));
    let receipt = result_json(parse(client, status, &bytes));
    let part = &receipt["parts"][0];
    assert_eq!(part["name"], "photo");
    assert_eq!(part["contentType"], "image/png");
    assert_eq!(part["size"], 6);
    assert!(part["fileName"].as_str().unwrap().ends_with(".png"));

    netkit_client_free(client);
}
