use std::collections::HashSet;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::block;
use crate::component::Component;
use crate::error::Result;
use crate::kind::Kind;
use crate::object::HostBlock;
use crate::store::Store;

pub struct ForgetStats {
    pub generations_forgotten: usize,
    pub blocks_removed: usize,
    pub blocks_kept: usize,
}

/// drop generations from the history and sweep everything they alone kept
/// alive
///
/// the host block is rewritten first, listing only the surviving
/// generations and the map blocks that still describe live data; then every
/// block unreachable from the new host block is removed from the backend.
pub fn forget<B: Backend>(store: &mut Store<B>, gen_ids: &[String]) -> Result<ForgetStats> {
    let host_id = store.config().effective_host_id();
    let Some(host) = store.get_host_block(&host_id)? else {
        warn!(%host_id, "no host block, nothing to forget");
        return Ok(ForgetStats {
            generations_forgotten: 0,
            blocks_removed: 0,
            blocks_kept: 0,
        });
    };
    store.load_maps(&host.map_ids)?;
    store.load_contmaps(&host.contmap_ids)?;

    let mut kept_gens = host.gen_ids.clone();
    let mut forgotten = 0;
    for gen_id in gen_ids {
        match kept_gens.iter().position(|id| id == gen_id) {
            Some(at) => {
                kept_gens.remove(at);
                forgotten += 1;
            }
            None => warn!(%gen_id, "generation is not known"),
        }
    }

    // blocks reachable from the surviving generations
    let data_blocks = reachable_data_blocks(store, &kept_gens)?;

    // map blocks that still describe at least one live data block
    let map_ids = live_map_blocks(store, &host.map_ids, &data_blocks)?;
    let contmap_ids = live_map_blocks(store, &host.contmap_ids, &data_blocks)?;

    let new_host = HostBlock {
        host_id: host.host_id.clone(),
        gen_ids: kept_gens,
        map_ids,
        contmap_ids,
    };
    store.put_host_block(&new_host)?;

    // sweep: everything not reachable from the new host block goes
    let mut keep: HashSet<String> = data_blocks;
    keep.insert(new_host.host_id.clone());
    keep.extend(new_host.map_ids.iter().cloned());
    keep.extend(new_host.contmap_ids.iter().cloned());

    let mut stats = ForgetStats {
        generations_forgotten: forgotten,
        blocks_removed: 0,
        blocks_kept: 0,
    };
    for block_id in store.backend().list_blocks()? {
        if keep.contains(&block_id) {
            stats.blocks_kept += 1;
        } else {
            info!(%block_id, "removing unreferenced block");
            store.backend_mut().remove_block(&block_id)?;
            stats.blocks_removed += 1;
        }
    }
    Ok(stats)
}

/// chase every REF component from the given generations, collecting the
/// ids of all blocks holding reachable objects
fn reachable_data_blocks<B: Backend>(
    store: &mut Store<B>,
    gen_ids: &[String],
) -> Result<HashSet<String>> {
    let mut pending: Vec<String> = gen_ids.to_vec();
    let mut seen_objects: HashSet<String> = pending.iter().cloned().collect();
    let mut blocks = HashSet::new();

    while let Some(object_id) = pending.pop() {
        let Some(block_id) = store.block_id_of(&object_id).map(str::to_owned) else {
            warn!(%object_id, "no block found for reachable object");
            continue;
        };
        if !blocks.insert(block_id.clone()) {
            continue;
        }
        let Some(encoded) = store.backend().get_block(&block_id)? else {
            warn!(%block_id, "reachable block missing from backend");
            continue;
        };
        let components = block::decode(&encoded)?;
        let mut refs = Vec::new();
        collect_refs(&components, &mut refs);
        for reference in refs {
            if seen_objects.insert(reference.clone()) {
                pending.push(reference);
            }
        }
    }
    Ok(blocks)
}

/// every reference payload in a component tree
fn collect_refs(components: &[Component], out: &mut Vec<String>) {
    for component in components {
        if component.kind().is_ref() {
            if let Some(id) = component.str_value() {
                out.push(id.to_owned());
            }
        } else if let Some(children) = component.children() {
            collect_refs(children, out);
        }
    }
}

/// which of the given map blocks mention at least one live data block
fn live_map_blocks<B: Backend>(
    store: &mut Store<B>,
    map_block_ids: &[String],
    data_blocks: &HashSet<String>,
) -> Result<Vec<String>> {
    let mut live = Vec::new();
    for map_block_id in map_block_ids {
        let Some(encoded) = store.backend().get_block(map_block_id)? else {
            warn!(%map_block_id, "map block missing from backend");
            continue;
        };
        let components = block::decode(&encoded)?;
        let referenced = components.iter().any(|c| {
            c.kind() == Kind::ObjMap
                && c.first_str_by_kind(Kind::BlockRef)
                    .is_some_and(|b| data_blocks.contains(b))
        });
        if referenced {
            live.push(map_block_id.clone());
        }
    }
    Ok(live)
}
