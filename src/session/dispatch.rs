// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `SERVE` (§4.H step 6): maps a decoded [`Request`] to the actuator call
//! that implements it, threading the result into the session's
//! [`UndoLedger`] and reporting back a [`ServiceError`] the caller turns
//! into an ack.

use std::time::Duration;

use tokio::sync::Semaphore;

use crate::cfg::ServiceSettings;
use crate::dns;
use crate::errors::{Result, ServiceError};
use crate::firewall::{self, WfpBlockFlags};
use crate::ledger::{UndoKind, UndoLedger, UndoRecord};
use crate::net::{self, AddressRecord, RouteRecord};
use crate::protocol::codec::Request;
use crate::ring_buffer;
use crate::session::handle::OwnedHandle;

/// State a single session's dispatcher needs beyond the request itself:
/// its undo ledger, the launched engine's process handle (source for ring
/// buffer handle duplication), and the process-wide register-DNS gate.
pub struct DispatchContext<'a> {
    pub ledger: &'a mut UndoLedger,
    pub engine_process: &'a OwnedHandle,
    pub register_dns_gate: &'a Semaphore,
    pub register_dns_timeout: Duration,
}

impl<'a> DispatchContext<'a> {
    pub fn new(
        ledger: &'a mut UndoLedger,
        engine_process: &'a OwnedHandle,
        register_dns_gate: &'a Semaphore,
        settings: &ServiceSettings,
    ) -> Self {
        Self { ledger, engine_process, register_dns_gate, register_dns_timeout: settings.register_dns_timeout }
    }
}

/// Executes one decoded request against live OS state.
pub async fn dispatch(request: Request, ctx: &mut DispatchContext<'_>) -> Result<()> {
    match request {
        Request::AddAddress { family, prefix_len, iface, address } => {
            let record = AddressRecord { family, address, prefix_len, iface };
            net::add_address(&record)?;
            ctx.ledger.append(UndoRecord::Address(record));
            Ok(())
        },
        Request::DelAddress { family, prefix_len, iface, address } => {
            let record = AddressRecord { family, address, prefix_len, iface };
            net::del_address(&record)?;
            ctx.ledger.remove_matching(UndoKind::Address, |r| matches!(r, UndoRecord::Address(a) if *a == record));
            Ok(())
        },
        Request::AddRoute { family, prefix_len, iface, prefix, gateway, metric } => {
            let record = RouteRecord { family, prefix, prefix_len, gateway, metric, iface };
            net::add_route(&record)?;
            ctx.ledger.append(UndoRecord::Route(record));
            Ok(())
        },
        Request::DelRoute { family, prefix_len, iface, prefix, gateway, metric } => {
            let record = RouteRecord { family, prefix, prefix_len, gateway, metric, iface };
            net::del_route(&record)?;
            ctx.ledger.remove_matching(UndoKind::Route, |r| matches!(r, UndoRecord::Route(rt) if *rt == record));
            Ok(())
        },
        Request::FlushNeighbors { family, iface } => net::flush_neighbors(family, &iface),
        Request::AddWfpBlock { flags, iface } => {
            let prior = ctx.ledger.remove_matching(UndoKind::WfpBlock, |_| true);
            if let Some(UndoRecord::WfpBlock(old)) = prior {
                firewall::del_wfp_block(&old)?;
            }
            let flags = WfpBlockFlags::from_bits_truncate(flags);
            let record = firewall::add_wfp_block(&iface, flags)?;
            ctx.ledger.append(UndoRecord::WfpBlock(record));
            Ok(())
        },
        Request::DelWfpBlock { iface } => {
            let removed = ctx
                .ledger
                .remove_matching(UndoKind::WfpBlock, |r| matches!(r, UndoRecord::WfpBlock(b) if b.iface == iface));
            match removed {
                Some(UndoRecord::WfpBlock(record)) => firewall::del_wfp_block(&record),
                _ => Err(ServiceError::Other("no active WFP block on this interface".into())),
            }
        },
        Request::RegisterDns => register_dns(ctx).await,
        Request::AddDnsCfg { iface, family, addrs, domains } => {
            let iface_uuid = crate::net::route::resolve_iface_uuid(&iface)?;
            let outcome = dns::servers::add_dns_cfg(&iface_uuid, family, &addrs, &domains)?;
            ctx.ledger.remove_matching(UndoKind::DnsServers, |r| {
                matches!(r, UndoRecord::DnsServers(d) if d.iface_uuid == iface_uuid && d.family_v6 == matches!(family, net::Family::V6))
            });
            ctx.ledger.append(outcome.servers);
            if let Some(search_list) = outcome.search_list {
                ctx.ledger.append(search_list);
            }
            Ok(())
        },
        Request::DelDnsCfg { iface, family, domains } => {
            let iface_uuid = crate::net::route::resolve_iface_uuid(&iface)?;
            dns::servers::del_dns_cfg(&iface_uuid, family, &domains)?;
            ctx.ledger.remove_matching(UndoKind::DnsServers, |r| {
                matches!(r, UndoRecord::DnsServers(d) if d.iface_uuid == iface_uuid && d.family_v6 == matches!(family, net::Family::V6))
            });
            if !domains.is_empty() {
                ctx.ledger.remove_matching(UndoKind::DnsSearchDomains, |r| {
                    matches!(r, UndoRecord::DnsSearchDomains(s) if s.domains == domains)
                });
            }
            Ok(())
        },
        Request::AddWinsCfg { iface, addrs } => {
            let record = dns::add_wins_cfg(&iface, &addrs)?;
            ctx.ledger.append(UndoRecord::Wins(record));
            Ok(())
        },
        Request::DelWinsCfg { iface } => {
            dns::del_wins_cfg(&iface)?;
            ctx.ledger.remove_matching(UndoKind::Wins, |_| true);
            Ok(())
        },
        Request::EnableDhcp { iface } => net::enable_dhcp(&iface),
        Request::RegisterRingBuffers { device, send_ring, recv_ring, send_tail_event, recv_tail_event } => {
            let mapping =
                ring_buffer::register(ctx.engine_process, device, send_ring, recv_ring, send_tail_event, recv_tail_event)?;
            ctx.ledger.append(UndoRecord::RingBuffers(mapping));
            Ok(())
        },
        Request::SetMtu { family, iface, mtu } => net::set_mtu(family, &iface, mtu),
    }
}

/// `RegisterDns`: the one request type gated by a process-wide semaphore
/// (§4.F) rather than being free to run concurrently across sessions —
/// `ipconfig /flushdns` and `/registerdns` operate on global resolver
/// state, so two sessions racing them would be unobservable from either
/// caller's perspective. Not recorded in the ledger: nothing here is
/// reversible, or needs to be, once the session that requested it ends.
async fn register_dns(ctx: &mut DispatchContext<'_>) -> Result<()> {
    let _permit = tokio::time::timeout(ctx.register_dns_timeout, ctx.register_dns_gate.acquire())
        .await
        .map_err(|_| ServiceError::Other("timed out waiting for the register-DNS gate".into()))?
        .map_err(|_| ServiceError::Other("register-DNS gate closed".into()))?;

    // §6: ipconfig.exe is allowed up to 600 s per invocation (netsh.exe,
    // used elsewhere for WINS/DHCP, gets the shorter 30 s).
    const IPCONFIG_TIMEOUT: Duration = Duration::from_secs(600);
    tokio::task::spawn_blocking(|| {
        crate::cfg::external::run_external("ipconfig", &["/flushdns"], IPCONFIG_TIMEOUT)?;
        crate::cfg::external::run_external("ipconfig", &["/registerdns"], IPCONFIG_TIMEOUT)
    })
    .await
    .map_err(|e| ServiceError::Other(format!("register-DNS task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_dns_gate_allows_only_one_concurrent_holder() {
        let gate = Semaphore::new(1);
        let first = gate.try_acquire();
        assert!(first.is_ok());
        let second = gate.try_acquire();
        assert!(second.is_err());
    }
}
