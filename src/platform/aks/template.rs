/// Terraform input for an AKS cluster
pub(super) const CLUSTER_TEMPLATE: &str = r#"locals {
  subscription_id           = "{{ subscription_id }}"
  tenant_id                 = "{{ tenant_id }}"
  application_name          = "{{ application_name }}"
  location                  = "{{ location }}"
  resource_group_name       = "{{ resource_group_name }}"
  kubernetes_version        = "{{ kubernetes_version }}"
  cluster_name              = "{{ cluster_name }}"
  default_node_pool_name    = "{{ default_pool.name }}"
  default_node_pool_vm_size = "{{ default_pool.size }}"
  default_node_pool_count   = {{ default_pool.count }}
}

terraform {
  required_providers {
    azurerm = {
      source  = "hashicorp/azurerm"
      version = "2.2.0"
    }
    azuread = {
      source  = "hashicorp/azuread"
      version = "0.8.0"
    }
    random = {
      source  = "hashicorp/random"
      version = "2.2.1"
    }
    local = {
      source  = "hashicorp/local"
      version = "1.4.0"
    }
  }
}

provider "azurerm" {
  subscription_id = local.subscription_id
  tenant_id       = local.tenant_id

  features {}
}

provider "azuread" {
  tenant_id = local.tenant_id
}

resource "azurerm_resource_group" "aks" {
  name     = local.resource_group_name
  location = local.location
}

resource "azuread_application" "aks" {
  name = local.application_name
}

resource "azuread_service_principal" "aks" {
  application_id = azuread_application.aks.application_id
}

resource "random_string" "password" {
  length  = 16
  special = true

  override_special = "/@\" "
}

resource "azuread_application_password" "aks" {
  application_object_id = azuread_application.aks.object_id
  value                 = random_string.password.result
  end_date_relative     = "86000h"
}

resource "azurerm_role_assignment" "aks" {
  scope                = "/subscriptions/${local.subscription_id}"
  role_definition_name = "Contributor"
  principal_id         = azuread_service_principal.aks.id
}

resource "azurerm_kubernetes_cluster" "aks" {
  name                = local.cluster_name
  location            = azurerm_resource_group.aks.location
  resource_group_name = azurerm_resource_group.aks.name
  kubernetes_version  = local.kubernetes_version
  dns_prefix          = local.cluster_name

  default_node_pool {
    name       = local.default_node_pool_name
    vm_size    = local.default_node_pool_vm_size
    node_count = local.default_node_pool_count
{{#if default_pool.has_labels}}

    node_labels = {
{{#each default_pool.labels}}
      "{{ @key }}" = "{{ this }}"
{{/each}}
    }
{{/if}}
{{#if default_pool.has_taints}}

    node_taints = [
{{#each default_pool.taints}}
      "{{ this }}",
{{/each}}
    ]
{{/if}}
  }

  role_based_access_control {
    enabled = true
  }

  service_principal {
    client_id     = azuread_application.aks.application_id
    client_secret = azuread_application_password.aks.value
  }

  network_profile {
    network_plugin = "kubenet"
    network_policy = "calico"
  }
{{#if default_pool.has_tags}}

  tags = {
{{#each default_pool.tags}}
    "{{ @key }}" = "{{ this }}"
{{/each}}
  }
{{/if}}
}
{{#each extra_pools}}

resource "azurerm_kubernetes_cluster_node_pool" "worker-{{ name }}" {
  name                  = "{{ name }}"
  kubernetes_cluster_id = azurerm_kubernetes_cluster.aks.id
  vm_size               = "{{ size }}"
  node_count            = {{ count }}
{{#if has_labels}}

  node_labels = {
{{#each labels}}
    "{{ @key }}" = "{{ this }}"
{{/each}}
  }
{{/if}}
{{#if has_taints}}

  node_taints = [
{{#each taints}}
    "{{ this }}",
{{/each}}
  ]
{{/if}}
{{#if has_tags}}

  tags = {
{{#each tags}}
    "{{ @key }}" = "{{ this }}"
{{/each}}
  }
{{/if}}
}
{{/each}}

resource "local_file" "kubeconfig" {
  sensitive_content = azurerm_kubernetes_cluster.aks.kube_config_raw
  filename          = "../auth/kubeconfig"
}

output "initialized" {
  value = true
}
"#;
