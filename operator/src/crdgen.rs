use kube::CustomResourceExt;

fn main() {
    println!("---");
    print!("{}", serde_yaml::to_string(&common::FacadeService::crd()).unwrap());
    println!("---");
    print!("{}", serde_yaml::to_string(&common::Gateway::crd()).unwrap());
}
