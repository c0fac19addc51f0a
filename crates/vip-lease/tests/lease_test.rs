use async_trait::async_trait;
use common::Result;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use vip_lease::{DhcpClient, LeaseManager, LinkOps, VipRole, interface_name, mac_address};

#[derive(Default)]
struct FakeLinks {
    present: Mutex<HashSet<String>>,
    up: Mutex<HashSet<String>>,
    created: AtomicU32,
}

#[async_trait]
impl LinkOps for FakeLinks {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.present.lock().unwrap().contains(name))
    }

    async fn create_macvlan(&self, name: &str, uplink: &str, mac: &str) -> Result<()> {
        assert_eq!(uplink, "ens3");
        assert_eq!(mac, mac_address(name));
        assert!(self.present.lock().unwrap().insert(name.to_string()));
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_up(&self, name: &str) -> Result<()> {
        self.up.lock().unwrap().insert(name.to_string());
        Ok(())
    }
}

/// Hands out 192.168.111.10, .11, ... and appends each lease to the file.
#[derive(Default)]
struct FakeDhcp {
    runs: AtomicU32,
}

#[async_trait]
impl DhcpClient for FakeDhcp {
    async fn acquire(&self, interface: &str, lease_file: &Path, _hostname: &str) -> Result<()> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst);
        let block = format!(
            "lease {{\n  interface \"{}\";\n  fixed-address 192.168.111.{};\n}}\n",
            interface,
            10 + n
        );
        let mut contents = tokio::fs::read_to_string(lease_file).await.unwrap_or_default();
        contents.push_str(&block);
        tokio::fs::write(lease_file, contents).await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_ensure_all_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let lease_dir = dir.path().join("leases");
    let manager = LeaseManager::new(
        FakeLinks::default(),
        FakeDhcp::default(),
        "ostest",
        "ens3",
        &lease_dir,
    );
    let roles = [VipRole::Api, VipRole::Ingress];

    let first = manager.ensure_all(&roles).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].interface, interface_name("ostest", VipRole::Api));
    assert_eq!(first[0].address.to_string(), "192.168.111.10");
    assert_eq!(first[1].address.to_string(), "192.168.111.11");
    assert!(first[0].lease_file.starts_with(&lease_dir));

    let second = manager.ensure_all(&roles).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_lost_lease_is_renewed() {
    let dir = tempfile::tempdir().unwrap();
    let manager = LeaseManager::new(
        FakeLinks::default(),
        FakeDhcp::default(),
        "ostest",
        "ens3",
        dir.path(),
    );

    let first = manager.ensure(VipRole::Dns).await.unwrap();
    std::fs::remove_file(&first.lease_file).unwrap();

    let second = manager.ensure(VipRole::Dns).await.unwrap();
    assert_eq!(second.interface, first.interface);
    assert_eq!(second.address.to_string(), "192.168.111.11");
}
