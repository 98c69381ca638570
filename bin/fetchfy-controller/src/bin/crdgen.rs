//! Print the Gateway CRD as YAML

use fetchfy_api::Gateway;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Gateway::crd())?);
    Ok(())
}
