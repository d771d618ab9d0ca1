/// Terraform input for a self-managed cluster on Hetzner Cloud.
///
/// The module sources it refers to are written by `Hcloud::initialize`.
pub(super) const CLUSTER_TEMPLATE: &str = r#"terraform {
  required_providers {
    hcloud = {
      source  = "hetznercloud/hcloud"
      version = "~> 1.45"
    }
    local = {
      source  = "hashicorp/local"
      version = "~> 2.4"
    }
  }
}

provider "hcloud" {}

locals {
  cluster_name = "{{ cluster_name }}"
  location     = "{{ location }}"
  image        = "{{ image }}"
  ssh_keys     = [{{#each ssh_keys}}"{{ this }}"{{#unless @last}}, {{/unless}}{{/each}}]

  labels = {
{{#each tags}}
    "{{ @key }}" = "{{ this }}"
{{/each}}
  }
}

resource "hcloud_network" "cluster" {
  name     = local.cluster_name
  ip_range = "{{ network.cidr }}"
  labels   = local.labels
}

resource "hcloud_network_subnet" "cluster" {
  network_id   = hcloud_network.cluster.id
  type         = "cloud"
  network_zone = "{{ network.zone }}"
  ip_range     = "{{ network.subnet_cidr }}"
}

module "cluster" {
  source = "../terraform-modules/hcloud/cluster"

  cluster_name     = local.cluster_name
  location         = local.location
  network_id       = hcloud_network.cluster.id
  subnet_cidr      = hcloud_network_subnet.cluster.ip_range
  image            = local.image
  controller_count = {{ controller_count }}
  controller_type  = "{{ controller_type }}"
  ssh_keys         = local.ssh_keys
  labels           = local.labels

  worker_pool_name  = "{{ default_pool.name }}"
  worker_type       = "{{ default_pool.size }}"
  worker_count      = {{ default_pool.count }}
  worker_node_labels = {
{{#each default_pool.labels}}
    "{{ @key }}" = "{{ this }}"
{{/each}}
  }
  worker_taints = [
{{#each default_pool.taints}}
    "{{ this }}",
{{/each}}
  ]

  depends_on = [hcloud_network_subnet.cluster]
}
{{#each extra_pools}}

module "worker-{{ name }}" {
  source = "../terraform-modules/hcloud/worker-pool"

  cluster_name = local.cluster_name
  location     = local.location
  network_id   = hcloud_network.cluster.id
  image        = local.image
  ssh_keys     = local.ssh_keys
  join_config  = module.cluster.worker_join_config
  labels       = local.labels

  pool_name   = "{{ name }}"
  server_type = "{{ size }}"
  node_count  = {{ count }}
  node_labels = {
{{#each labels}}
    "{{ @key }}" = "{{ this }}"
{{/each}}
  }
  taints = [
{{#each taints}}
    "{{ this }}",
{{/each}}
  ]
}
{{/each}}

resource "local_sensitive_file" "kubeconfig" {
  content  = module.cluster.kubeconfig
  filename = "../auth/kubeconfig"
}

output "initialized" {
  value = true
}
"#;

pub(super) const CLUSTER_MODULE: &str = include_str!("modules/cluster/main.tf");
pub(super) const WORKER_POOL_MODULE: &str = include_str!("modules/worker-pool/main.tf");
