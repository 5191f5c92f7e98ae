use crate::OPERATOR_NAME;
use kube::runtime::events::Reporter;

fn get_prog_name() -> Option<String> {
    std::env::current_exe()
        .ok()?
        .file_name()?
        .to_str()?
        .to_owned()
        .into()
}

pub fn get_client_name() -> String {
    match get_prog_name() {
        Some(p) if p == "operator" => format!("controller.{OPERATOR_NAME}.netcracker.com"),
        Some(p) if p == "crdgen" => format!("crdgen.{OPERATOR_NAME}.netcracker.com"),
        _ => format!("{OPERATOR_NAME}.netcracker.com"),
    }
}

pub fn get_short_name() -> String {
    let long = get_client_name();
    let lst = long.split('.').collect::<Vec<&str>>();
    if lst.len() > 3 {
        format!("{}-{}", lst[1], lst[0])
    } else {
        OPERATOR_NAME.to_string()
    }
}

pub fn get_reporter() -> Reporter {
    Reporter {
        controller: get_short_name(),
        instance: Some(std::env::var("POD_NAME").unwrap_or_else(|_| "unknown".to_string())),
    }
}
