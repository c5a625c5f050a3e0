//! The painter: maps the sorted draw list onto layers and repaints them.
//!
//! Layers are keyed by zlevel in an ordered map, created lazily the first
//! time an element lands on a level. Each refresh runs a status pass
//! (element counts, dirty accumulation, progressive bucketing) and then a
//! single left-to-right paint scan over the draw list; a layer whose
//! contents did not change is left untouched. Progressive buckets paint one
//! frame index per scheduled host tick onto a bounded pool of offscreen
//! layers and are blitted onto their home layer as they accumulate.

use std::collections::{BTreeMap, HashMap};

use sable_scene::{NodeId, Storage, Style};
use sable_surface::{
    FrameScheduler, Path, PremulRgba, Rect, Surface, SurfaceFactory, Transform2D,
};

use crate::hover::HoverMirror;
use crate::layer::{Layer, LayerConfig};

/// Size of the dedicated progressive layer pool. Buckets beyond the pool are
/// forced onto the final layer.
pub const MAX_PROGRESSIVE_LAYERS: usize = 5;

/// The overlay layer sits above every ordinary ordering level.
pub const HOVER_ZLEVEL: i32 = 100_000;

/// Options for [`Painter::render_to_single_surface`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleSurfaceOptions {
    pub clear_color: Option<PremulRgba>,
    /// Defaults to the painter's device pixel ratio.
    pub pixel_ratio: Option<f64>,
}

/// Clip state carried along one surface's paint scan. Re-issuing clip
/// primitives is only needed when the chain actually changes, since clip
/// regions stack by intersection.
#[derive(Debug, Default)]
struct PaintScope {
    chain: Vec<NodeId>,
    pushed: bool,
}

fn close_scope(surface: &mut dyn Surface, scope: &mut PaintScope) {
    if scope.pushed {
        surface.restore();
    }
    scope.chain.clear();
    scope.pushed = false;
}

/// Paint one displayable onto `surface`, diffing its clip chain against the
/// scope. With a `style_override` (highlight mirrors) only the invisible
/// check applies; otherwise fully transparent, doubly-degenerate and
/// viewport-culled elements are skipped without touching the surface.
fn paint_element(
    store: &mut Storage,
    id: NodeId,
    surface: &mut dyn Surface,
    viewport: Rect,
    style_override: Option<&Style>,
    scope: &mut PaintScope,
) {
    let Some(node) = store.get_mut(id) else {
        return;
    };
    if node.invisible() {
        return;
    }
    let transform = *node.transform();
    if style_override.is_none() {
        if node.style().is_some_and(|s| s.opacity == 0.0) {
            return;
        }
        // A zero-scale transform corrupts subsequent transform state on some
        // backends; skip the element outright.
        if transform.is_zero_scale() {
            return;
        }
        if !node.bounding_rect().transformed(&transform).intersects(&viewport) {
            return;
        }
    }
    let chain = node.clip_chain().to_vec();

    if chain != scope.chain {
        if scope.pushed {
            surface.restore();
            scope.pushed = false;
        }
        if !chain.is_empty() {
            // Each clip shape is rasterized in its own transform, which the
            // store computed relative to the element it clips.
            let clip_data: Vec<(Transform2D, Path)> = chain
                .iter()
                .filter_map(|cid| {
                    store
                        .get(*cid)
                        .and_then(|c| c.path().map(|p| (*c.transform(), p.clone())))
                })
                .collect();
            surface.save();
            for (tf, path) in &clip_data {
                surface.set_transform(tf);
                surface.clip_path(path);
            }
            scope.pushed = true;
        }
        scope.chain = chain;
    }

    surface.set_transform(&transform);
    if let Some(node) = store.get(id) {
        match style_override {
            Some(style) => node.draw_with(style, surface),
            None => node.draw(surface),
        }
    }
}

/// The display engine.
pub struct Painter {
    layers: BTreeMap<i32, Layer>,
    layer_configs: HashMap<i32, LayerConfig>,
    progressive_layers: Vec<Layer>,
    hover: Vec<HoverMirror>,
    factory: Box<dyn SurfaceFactory>,
    scheduler: Box<dyn FrameScheduler>,
    width: u32,
    height: u32,
    dpr: f64,
    /// Global progressive frame counter for the current paint sequence; -1
    /// during the initial full pass, then one frame index per tick.
    progress: i64,
    further_progressive: bool,
    /// Bumped by every full repaint and by disposal so that stale scheduled
    /// continuations are dropped on arrival.
    progressive_token: u64,
    pending_token: Option<u64>,
    disposed: bool,
}

impl Painter {
    pub fn new(
        factory: Box<dyn SurfaceFactory>,
        scheduler: Box<dyn FrameScheduler>,
        width: u32,
        height: u32,
        device_pixel_ratio: f64,
    ) -> Self {
        Self {
            layers: BTreeMap::new(),
            layer_configs: HashMap::new(),
            progressive_layers: Vec::new(),
            hover: Vec::new(),
            factory,
            scheduler,
            width,
            height,
            dpr: device_pixel_ratio,
            progress: -1,
            further_progressive: false,
            progressive_token: 0,
            pending_token: None,
            disposed: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.dpr
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn layer(&self, zlevel: i32) -> Option<&Layer> {
        self.layers.get(&zlevel)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn progressive_layer_count(&self) -> usize {
        self.progressive_layers.len()
    }

    pub fn hover_count(&self) -> usize {
        self.hover.len()
    }

    fn device_size(&self) -> (u32, u32) {
        (
            (f64::from(self.width) * self.dpr).round() as u32,
            (f64::from(self.height) * self.dpr).round() as u32,
        )
    }

    // --- layer management ---------------------------------------------------

    /// Register an externally supplied surface as the layer for `zlevel`.
    /// A level that is already in use is rejected with a diagnostic and the
    /// prior state is left unchanged.
    pub fn insert_layer(&mut self, zlevel: i32, surface: Box<dyn Surface>) {
        if self.disposed {
            log::warn!("insert_layer on a disposed painter; ignored");
            return;
        }
        if self.layers.contains_key(&zlevel) {
            log::warn!("zlevel {zlevel} has been used already; layer rejected");
            return;
        }
        let mut layer = Layer::new(surface, false);
        if let Some(config) = self.layer_configs.get(&zlevel) {
            layer.apply_config(config);
        }
        self.layers.insert(zlevel, layer);
    }

    /// Set drawing options for a zlevel, merged onto the existing layer and
    /// remembered for one created later.
    pub fn configure_layer(&mut self, zlevel: i32, config: LayerConfig) {
        self.layer_configs.insert(zlevel, config);
        if let Some(layer) = self.layers.get_mut(&zlevel) {
            layer.apply_config(&config);
        }
    }

    /// Remove the layer at `zlevel` entirely.
    pub fn del_layer(&mut self, zlevel: i32) {
        self.layers.remove(&zlevel);
    }

    /// Clear one layer's content.
    pub fn clear_layer(&mut self, zlevel: i32) {
        if let Some(layer) = self.layers.get_mut(&zlevel) {
            layer.clear();
        }
    }

    /// Clear every built-in layer.
    pub fn clear_all(&mut self) {
        for layer in self.layers.values_mut().filter(|l| l.builtin) {
            layer.clear();
        }
    }

    /// Create the built-in layer for `zlevel` if it does not exist yet.
    /// Returns false when surface creation failed (logged, level skipped).
    fn ensure_layer(&mut self, zlevel: i32) -> bool {
        if self.layers.contains_key(&zlevel) {
            return true;
        }
        let (pw, ph) = self.device_size();
        match self.factory.create_surface(pw, ph) {
            Ok(surface) => {
                let mut layer = Layer::new(surface, true);
                if let Some(config) = self.layer_configs.get(&zlevel) {
                    layer.apply_config(config);
                }
                self.layers.insert(zlevel, layer);
                true
            }
            Err(err) => {
                log::error!("creating surface for zlevel {zlevel} failed: {err}");
                false
            }
        }
    }

    fn ensure_progressive_layer(&mut self, index: usize) -> bool {
        while self.progressive_layers.len() <= index {
            let (pw, ph) = self.device_size();
            match self.factory.create_surface(pw, ph) {
                Ok(surface) => self.progressive_layers.push(Layer::new(surface, true)),
                Err(err) => {
                    log::error!("creating progressive layer failed: {err}");
                    return false;
                }
            }
        }
        true
    }

    // --- refresh ------------------------------------------------------------

    /// Repaint everything that needs it. With `paint_all` every layer is
    /// cleared and redrawn regardless of dirty state.
    pub fn refresh(&mut self, store: &mut Storage, paint_all: bool) {
        if self.disposed {
            log::warn!("refresh on a disposed painter; ignored");
            return;
        }
        let list = store.display_list(true, false).to_vec();
        self.paint_list(store, &list, paint_all);

        for layer in self.layers.values_mut().filter(|l| !l.builtin) {
            layer.surface.present();
        }

        self.refresh_hover(store);

        if self.further_progressive {
            self.start_progressive();
        }
    }

    /// Deliver one host frame that was requested through the scheduler.
    /// Continues an outstanding progressive sequence; stale requests (a full
    /// refresh or disposal happened in between) are dropped.
    pub fn on_frame(&mut self, store: &mut Storage) {
        if self.disposed {
            return;
        }
        let Some(token) = self.pending_token.take() else {
            return;
        };
        if token != self.progressive_token {
            return;
        }
        // Same list as the initiating pass; progressive progress is only
        // valid against an unchanged draw list.
        let list = store.display_list(false, false).to_vec();
        self.do_paint_list(store, &list, false);
        if self.further_progressive {
            self.start_progressive();
        }
    }

    fn start_progressive(&mut self) {
        self.progress += 1;
        self.pending_token = Some(self.progressive_token);
        self.scheduler.request_frame();
    }

    fn paint_list(&mut self, store: &mut Storage, list: &[NodeId], paint_all: bool) {
        self.update_layer_status(store, list);
        self.clear_progressive();
        for layer in self.layers.values_mut().filter(|l| l.builtin) {
            layer.unused_count += 1;
        }
        self.do_paint_list(store, list, paint_all);
        for layer in self.layers.values_mut().filter(|l| l.builtin) {
            if layer.unused_count == 1 {
                layer.clear();
            }
        }
    }

    fn clear_progressive(&mut self) {
        self.progressive_token = self.progressive_token.wrapping_add(1);
        self.pending_token = None;
        self.progress = -1;
        for pool in &mut self.progressive_layers {
            if pool.dirty {
                pool.clear();
            }
        }
    }

    /// Pre-paint bookkeeping: recount layer occupancy, fold element dirt
    /// into layer dirt, force-dirty layers whose membership churned, and
    /// assign progressive frame indices.
    fn update_layer_status(&mut self, store: &mut Storage, list: &[NodeId]) {
        let mut counts_before: HashMap<i32, usize> = HashMap::new();
        for (level, layer) in self.layers.iter_mut() {
            if layer.builtin {
                counts_before.insert(*level, layer.element_count);
                layer.dirty = false;
            }
            layer.element_count = 0;
        }
        let pool_counts_before: Vec<usize> = self
            .progressive_layers
            .iter()
            .map(|l| l.element_count)
            .collect();
        for pool in &mut self.progressive_layers {
            pool.element_count = 0;
            pool.dirty = false;
            pool.max_progress = None;
        }

        let mut run_count = 0usize;
        let mut current_pool: Option<usize> = None;
        let mut last_tag: Option<i32> = None;
        let mut frame_count = 0usize;

        for (index, id) in list.iter().enumerate() {
            let Some((zlevel, tag, el_dirty)) = store
                .get(*id)
                .map(|n| (n.zlevel(), n.progressive(), n.is_dirty()))
            else {
                continue;
            };
            if let Some(layer) = self.layers.get_mut(&zlevel) {
                layer.element_count += 1;
                layer.dirty = layer.dirty || el_dirty;
            }

            if let Some(tag) = tag {
                // A new frame index starts whenever the tag value changes in
                // traversal order. Non-contiguous duplicates of a tag start
                // a fresh bucket instead of joining the earlier one.
                if last_tag != Some(tag) {
                    last_tag = Some(tag);
                    frame_count += 1;
                }
                let frame = frame_count - 1;
                if let Some(node) = store.get_mut(*id) {
                    node.set_frame_index(Some(frame));
                }

                if current_pool.is_none() {
                    let pool_index = run_count.min(MAX_PROGRESSIVE_LAYERS - 1);
                    if !self.ensure_progressive_layer(pool_index) {
                        continue;
                    }
                    current_pool = Some(pool_index);
                }
                let pool = &mut self.progressive_layers[current_pool.unwrap_or(0)];
                pool.dirty = pool.dirty || el_dirty;
                pool.element_count += 1;
                pool.max_progress = Some(pool.max_progress.map_or(frame, |m| m.max(frame)));

                // Keep the home layer repainting while this pool still has
                // outstanding frames, so each flushed increment lands.
                if pool.max_progress.is_some_and(|m| m >= pool.progress) {
                    if let Some(layer) = self.layers.get_mut(&zlevel) {
                        layer.dirty = true;
                    }
                }
            } else {
                if let Some(node) = store.get_mut(*id) {
                    node.set_frame_index(None);
                }
                if let Some(pool_index) = current_pool.take() {
                    self.progressive_layers[pool_index].next_non_progressive = index;
                    run_count += 1;
                }
            }
        }
        if let Some(pool_index) = current_pool {
            self.progressive_layers[pool_index].next_non_progressive = list.len();
            run_count += 1;
        }

        // Membership churn always requires a full repaint: removed geometry
        // cannot be subtracted from a raster surface.
        for (level, layer) in self.layers.iter_mut() {
            if layer.builtin && counts_before.get(level).copied().unwrap_or(0) != layer.element_count
            {
                layer.dirty = true;
            }
        }

        self.progressive_layers
            .truncate(run_count.min(MAX_PROGRESSIVE_LAYERS));
        for (index, pool) in self.progressive_layers.iter_mut().enumerate() {
            if pool_counts_before.get(index).copied().unwrap_or(0) != pool.element_count {
                pool.dirty = true;
            }
            if pool.dirty {
                pool.progress = 0;
            }
        }
    }

    /// One left-to-right scan of the sorted draw list.
    fn do_paint_list(&mut self, store: &mut Storage, list: &[NodeId], paint_all: bool) {
        let viewport = Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height));
        let frame = self.progress;
        let mut main_scope = PaintScope::default();
        let mut pool_scope = PaintScope::default();
        let mut current_level: Option<i32> = None;
        let mut current_dirty = false;
        let mut run_count = 0usize;
        let mut current_pool: Option<usize> = None;

        let mut i = 0;
        while i < list.len() {
            let id = list[i];
            let Some((el_frame, zlevel)) = store.get(id).map(|n| (n.frame_index(), n.zlevel()))
            else {
                i += 1;
                continue;
            };

            // Returning to normal elements flushes the active progressive
            // run onto its home layer.
            if el_frame.is_none() {
                if let Some(pool_index) = current_pool.take() {
                    self.flush_progressive(pool_index, current_level, &mut pool_scope);
                }
            }

            if current_level != Some(zlevel) {
                // Leaving a layer unwinds its clip state and the outer save,
                // so state from one layer's pass never leaks into the next.
                if let Some(previous) = current_level {
                    if let Some(layer) = self.layers.get_mut(&previous) {
                        close_scope(layer.surface.as_mut(), &mut main_scope);
                        layer.surface.restore();
                    }
                }
                main_scope = PaintScope::default();
                if !self.ensure_layer(zlevel) {
                    i += 1;
                    continue;
                }
                current_level = Some(zlevel);
                if let Some(layer) = self.layers.get_mut(&zlevel) {
                    if !layer.builtin {
                        log::warn!("zlevel {zlevel} is used by an externally supplied layer");
                    }
                    layer.unused_count = 0;
                    if layer.dirty || paint_all {
                        layer.clear();
                    }
                    layer.surface.save();
                    current_dirty = layer.dirty;
                }
            }

            if !(current_dirty || paint_all) {
                i += 1;
                continue;
            }

            if let Some(el_frame) = el_frame {
                if current_pool.is_none() {
                    let pool_index = run_count.min(MAX_PROGRESSIVE_LAYERS - 1);
                    if pool_index >= self.progressive_layers.len() {
                        i += 1;
                        continue;
                    }
                    run_count += 1;
                    current_pool = Some(pool_index);
                    pool_scope = PaintScope::default();
                    let pool = &mut self.progressive_layers[pool_index];
                    // This pool already painted every frame it was assigned;
                    // jump past the run. The flush at the next transition
                    // still blits the accumulated content.
                    if pool.max_progress.is_some_and(|m| pool.progress > m) {
                        i = pool.next_non_progressive;
                        continue;
                    }
                    if frame >= 0 {
                        pool.progress = frame as usize + 1;
                    }
                }
                if frame >= 0 && el_frame as i64 == frame {
                    if let Some(pool) = self
                        .progressive_layers
                        .get_mut(current_pool.unwrap_or(0))
                    {
                        paint_element(
                            store,
                            id,
                            pool.surface.as_mut(),
                            viewport,
                            None,
                            &mut pool_scope,
                        );
                    }
                }
            } else if let Some(layer) = self.layers.get_mut(&zlevel) {
                paint_element(
                    store,
                    id,
                    layer.surface.as_mut(),
                    viewport,
                    None,
                    &mut main_scope,
                );
            }

            if let Some(node) = store.get_mut(id) {
                node.mark_clean();
            }
            i += 1;
        }

        if let Some(pool_index) = current_pool.take() {
            self.flush_progressive(pool_index, current_level, &mut pool_scope);
        }
        if let Some(previous) = current_level {
            if let Some(layer) = self.layers.get_mut(&previous) {
                close_scope(layer.surface.as_mut(), &mut main_scope);
                layer.surface.restore();
            }
        }

        self.further_progressive = self
            .progressive_layers
            .iter()
            .any(|l| l.max_progress.is_some_and(|m| m >= l.progress));
    }

    /// Blit a progressive pool layer's accumulated content onto its home
    /// layer at device pixel scale, and keep that layer repainting so the
    /// contribution is not discarded by the next full pass.
    fn flush_progressive(
        &mut self,
        pool_index: usize,
        level: Option<i32>,
        scope: &mut PaintScope,
    ) {
        let source = match self.progressive_layers.get_mut(pool_index) {
            Some(pool) => {
                close_scope(pool.surface.as_mut(), scope);
                pool.surface.id()
            }
            None => return,
        };
        let Some(level) = level else {
            return;
        };
        let dpr = self.dpr;
        if let Some(layer) = self.layers.get_mut(&level) {
            let surface = layer.surface.as_mut();
            surface.save();
            surface.set_global_alpha(1.0);
            surface.set_transform(&Transform2D::identity());
            surface.draw_surface(source, dpr);
            surface.restore();
            layer.dirty = true;
        }
    }

    // --- hover overlay ------------------------------------------------------

    /// Mirror a node onto the overlay layer with a replacement style.
    /// Adding the same source twice is a no-op.
    pub fn add_hover(&mut self, source: NodeId, style: Style) {
        if self.disposed {
            log::warn!("add_hover on a disposed painter; ignored");
            return;
        }
        if self.hover.iter().any(|m| m.source == source) {
            return;
        }
        self.hover.push(HoverMirror::new(source, style));
    }

    /// Drop the mirror for `source` immediately.
    pub fn remove_hover(&mut self, source: NodeId) {
        self.hover.retain(|m| m.source != source);
    }

    pub fn clear_hover(&mut self) {
        self.hover.clear();
    }

    fn refresh_hover(&mut self, store: &mut Storage) {
        // Mirrors whose source left the store are pruned before painting.
        self.hover.retain(|m| store.contains(m.source));

        if let Some(layer) = self.layers.get_mut(&HOVER_ZLEVEL) {
            layer.clear();
        }
        if self.hover.is_empty() {
            return;
        }

        // Same ordering function as the main draw list, stable on ties.
        self.hover.sort_by_key(|m| {
            store
                .get(m.source)
                .map(|n| (n.zlevel(), n.z(), n.z2()))
                .unwrap_or_default()
        });

        if !self.ensure_layer(HOVER_ZLEVEL) {
            return;
        }
        let viewport = Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height));
        let mirrors = self.hover.clone();
        if let Some(layer) = self.layers.get_mut(&HOVER_ZLEVEL) {
            let surface = layer.surface.as_mut();
            surface.save();
            let mut scope = PaintScope::default();
            for mirror in &mirrors {
                paint_element(
                    store,
                    mirror.source,
                    surface,
                    viewport,
                    Some(&mirror.style),
                    &mut scope,
                );
            }
            close_scope(surface, &mut scope);
            surface.restore();
        }
    }

    // --- resize / compose / dispose -----------------------------------------

    /// Resize the viewport: re-applies device pixel scaling to every layer
    /// and forces a full repaint. A no-op when the size is unchanged.
    pub fn resize(&mut self, store: &mut Storage, width: u32, height: u32) {
        if self.disposed {
            log::warn!("resize on a disposed painter; ignored");
            return;
        }
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        let (pw, ph) = self.device_size();
        for layer in self.layers.values_mut() {
            layer.surface.resize(pw, ph);
        }
        for pool in &mut self.progressive_layers {
            pool.surface.resize(pw, ph);
        }
        self.refresh(store, true);
    }

    /// Composite the whole scene onto one freshly created surface: built-in
    /// content is repainted element by element, externally supplied layers
    /// are blitted in between at their ordering position.
    pub fn render_to_single_surface(
        &mut self,
        store: &mut Storage,
        options: SingleSurfaceOptions,
    ) -> Option<Box<dyn Surface>> {
        if self.disposed {
            log::warn!("render_to_single_surface on a disposed painter; ignored");
            return None;
        }
        let ratio = options.pixel_ratio.unwrap_or(self.dpr);
        let pw = (f64::from(self.width) * ratio).round() as u32;
        let ph = (f64::from(self.height) * ratio).round() as u32;
        let mut target = match self.factory.create_surface(pw, ph) {
            Ok(surface) => surface,
            Err(err) => {
                log::error!("creating composite surface failed: {err}");
                return None;
            }
        };
        target.clear(options.clear_color);

        let list = store.display_list(true, false).to_vec();
        let viewport = Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height));
        let mut scope = PaintScope::default();
        let mut previous_level: Option<i32> = None;
        for id in list {
            let Some(zlevel) = store.get(id).map(|n| n.zlevel()) else {
                continue;
            };
            if previous_level != Some(zlevel) {
                self.blit_external_between(target.as_mut(), previous_level, Some(zlevel));
                previous_level = Some(zlevel);
            }
            paint_element(store, id, target.as_mut(), viewport, None, &mut scope);
        }
        self.blit_external_between(target.as_mut(), previous_level, None);
        close_scope(target.as_mut(), &mut scope);
        Some(target)
    }

    fn blit_external_between(
        &self,
        target: &mut dyn Surface,
        lower: Option<i32>,
        upper: Option<i32>,
    ) {
        for (level, layer) in &self.layers {
            if layer.builtin {
                continue;
            }
            let above = lower.is_none_or(|l| *level > l);
            let below = upper.is_none_or(|u| *level < u);
            if above && below {
                target.save();
                target.draw_surface(layer.surface.id(), 1.0);
                target.restore();
            }
        }
    }

    /// Release every layer. Terminal: all further calls are logged no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.progressive_token = self.progressive_token.wrapping_add(1);
        self.pending_token = None;
        self.layers.clear();
        self.progressive_layers.clear();
        self.hover.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_surface::{ManualScheduler, RecordingFactory, RecordingSurface, Rgba, SurfaceOp};

    struct Fixture {
        painter: Painter,
        storage: Storage,
        factory: RecordingFactory,
        scheduler: ManualScheduler,
    }

    fn fixture(width: u32, height: u32) -> Fixture {
        let factory = RecordingFactory::new();
        let scheduler = ManualScheduler::new();
        let painter = Painter::new(
            Box::new(factory.clone()),
            Box::new(scheduler.clone()),
            width,
            height,
            1.0,
        );
        Fixture {
            painter,
            storage: Storage::new(),
            factory,
            scheduler,
        }
    }

    fn rect_root(f: &mut Fixture) -> NodeId {
        let id = f
            .storage
            .displayable(Path::rect(0.0, 0.0, 10.0, 10.0), Style::default());
        f.storage.add_root(id);
        id
    }

    fn layer_surface(f: &Fixture, zlevel: i32) -> RecordingSurface {
        let id = f.painter.layer(zlevel).unwrap().surface().id();
        f.factory.surface(id).unwrap()
    }

    fn fills(surface: &RecordingSurface) -> usize {
        surface.count_ops(|op| matches!(op, SurfaceOp::FillPath { .. }))
    }

    #[test]
    fn test_refresh_creates_layer_and_paints() {
        let mut f = fixture(100, 100);
        rect_root(&mut f);
        rect_root(&mut f);
        f.painter.refresh(&mut f.storage, false);

        assert_eq!(f.painter.layer_count(), 1);
        let surface = layer_surface(&f, 0);
        assert_eq!(surface.count_ops(|op| matches!(op, SurfaceOp::Clear(_))), 1);
        assert_eq!(fills(&surface), 2);
    }

    #[test]
    fn test_clean_layers_are_not_repainted() {
        let mut f = fixture(100, 100);
        rect_root(&mut f);
        rect_root(&mut f);
        f.painter.refresh(&mut f.storage, false);
        f.painter.refresh(&mut f.storage, false);

        let surface = layer_surface(&f, 0);
        // Content from the first pass survived; the second pass cleared and
        // painted nothing.
        assert_eq!(surface.count_ops(|op| matches!(op, SurfaceOp::Clear(_))), 1);
        assert_eq!(fills(&surface), 2);
    }

    #[test]
    fn test_membership_churn_forces_repaint() {
        let mut f = fixture(100, 100);
        rect_root(&mut f);
        let b = rect_root(&mut f);
        f.painter.refresh(&mut f.storage, false);

        // Nothing is dirty, but an element left the layer.
        f.storage.remove_root(b);
        f.painter.refresh(&mut f.storage, false);

        let surface = layer_surface(&f, 0);
        assert_eq!(surface.count_ops(|op| matches!(op, SurfaceOp::Clear(_))), 1);
        assert_eq!(fills(&surface), 1);
    }

    #[test]
    fn test_distinct_zlevels_get_distinct_layers_in_order() {
        let mut f = fixture(100, 100);
        let a = rect_root(&mut f);
        let b = rect_root(&mut f);
        f.storage.get_mut(a).unwrap().set_zlevel(2);
        f.storage.get_mut(b).unwrap().set_zlevel(-1);
        f.painter.refresh(&mut f.storage, false);

        assert_eq!(f.painter.layer_count(), 2);
        assert_eq!(fills(&layer_surface(&f, 2)), 1);
        assert_eq!(fills(&layer_surface(&f, -1)), 1);
    }

    #[test]
    fn test_skip_rules() {
        let mut f = fixture(100, 100);
        let invisible = rect_root(&mut f);
        let transparent = rect_root(&mut f);
        let degenerate = rect_root(&mut f);
        let offscreen = rect_root(&mut f);
        rect_root(&mut f); // the only one that paints

        f.storage.get_mut(invisible).unwrap().set_invisible(true);
        f.storage
            .get_mut(transparent)
            .unwrap()
            .style_mut()
            .unwrap()
            .opacity = 0.0;
        f.storage.get_mut(degenerate).unwrap().set_scale(0.0, 0.0);
        f.storage
            .get_mut(offscreen)
            .unwrap()
            .set_position(5000.0, 5000.0);

        f.painter.refresh(&mut f.storage, false);
        assert_eq!(fills(&layer_surface(&f, 0)), 1);
    }

    #[test]
    fn test_clip_chain_reissued_only_on_change() {
        let mut f = fixture(100, 100);
        let group = f.storage.group();
        let a = f
            .storage
            .displayable(Path::rect(0.0, 0.0, 10.0, 10.0), Style::default());
        let b = f
            .storage
            .displayable(Path::rect(20.0, 0.0, 10.0, 10.0), Style::default());
        f.storage.add_child(group, a);
        f.storage.add_child(group, b);
        f.storage.add_root(group);
        let x = f
            .storage
            .displayable(Path::rect(0.0, 0.0, 50.0, 50.0), Style::default());
        f.storage.set_clip_path(group, x);

        // A third element under its own clip follows in the same layer run.
        let inner = f.storage.group();
        let c = f
            .storage
            .displayable(Path::rect(40.0, 0.0, 10.0, 10.0), Style::default());
        f.storage.add_child(inner, c);
        f.storage.add_root(inner);
        let y = f
            .storage
            .displayable(Path::circle(45.0, 5.0, 20.0), Style::default());
        f.storage.set_clip_path(inner, y);

        f.painter.refresh(&mut f.storage, false);
        let surface = layer_surface(&f, 0);
        // Chain [x] issued once for a and b together, chain [y] once for c.
        assert_eq!(
            surface.count_ops(|op| matches!(op, SurfaceOp::ClipPath(_))),
            2
        );
        assert_eq!(fills(&surface), 3);
    }

    #[test]
    fn test_progressive_frame_indices_and_tick_count() {
        let mut f = fixture(100, 100);
        let mut ids = Vec::new();
        for i in 0..12 {
            let id = rect_root(&mut f);
            // Three contiguous groups of four.
            f.storage
                .get_mut(id)
                .unwrap()
                .set_progressive(Some(i / 4));
            ids.push(id);
        }
        f.painter.refresh(&mut f.storage, false);

        let frames: Vec<usize> = ids
            .iter()
            .map(|id| f.storage.get(*id).unwrap().frame_index().unwrap())
            .collect();
        assert_eq!(frames, vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(f.painter.progressive_layer_count(), 1);

        // The backlog drains in exactly three more scheduled ticks.
        let mut ticks = 0;
        while f.scheduler.take() {
            f.painter.on_frame(&mut f.storage);
            ticks += 1;
            assert!(ticks < 10, "progressive sequence failed to terminate");
        }
        assert_eq!(ticks, 3);

        let pool = f.painter.progressive_layers[0].surface.id();
        let pool_surface = f.factory.surface(pool).unwrap();
        assert_eq!(fills(&pool_surface), 12);
        // Accumulated content was blitted onto the home layer.
        let main = layer_surface(&f, 0);
        assert!(main.count_ops(|op| matches!(op, SurfaceOp::DrawSurface { .. })) >= 1);
    }

    #[test]
    fn test_progressive_noncontiguous_tags_start_new_buckets() {
        let mut f = fixture(100, 100);
        let mut ids = Vec::new();
        for tag in [5, 5, 9, 5] {
            let id = rect_root(&mut f);
            f.storage.get_mut(id).unwrap().set_progressive(Some(tag));
            ids.push(id);
        }
        f.painter.refresh(&mut f.storage, false);
        let frames: Vec<usize> = ids
            .iter()
            .map(|id| f.storage.get(*id).unwrap().frame_index().unwrap())
            .collect();
        assert_eq!(frames, vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_finished_progressive_sequence_schedules_nothing() {
        let mut f = fixture(100, 100);
        let id = rect_root(&mut f);
        f.storage.get_mut(id).unwrap().set_progressive(Some(1));
        f.painter.refresh(&mut f.storage, false);
        while f.scheduler.take() {
            f.painter.on_frame(&mut f.storage);
        }
        // A refresh over unchanged content must not restart the sequence.
        f.painter.refresh(&mut f.storage, false);
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_full_refresh_invalidates_pending_progressive_tick() {
        let mut f = fixture(100, 100);
        let id = rect_root(&mut f);
        f.storage.get_mut(id).unwrap().set_progressive(Some(1));
        f.painter.refresh(&mut f.storage, false);
        assert_eq!(f.scheduler.pending(), 1);
        let pool = f.painter.progressive_layers[0].surface.id();

        // The element stops being progressive and a full refresh runs before
        // the host delivers the scheduled tick: the tick must be dropped.
        f.storage.get_mut(id).unwrap().set_progressive(None);
        f.painter.refresh(&mut f.storage, false);
        assert!(f.scheduler.take());
        let before = fills(&f.factory.surface(pool).unwrap());
        f.painter.on_frame(&mut f.storage);
        assert_eq!(fills(&f.factory.surface(pool).unwrap()), before);
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_duplicate_external_layer_is_rejected() {
        let mut f = fixture(100, 100);
        let first = RecordingSurface::new(100, 100);
        let second = RecordingSurface::new(100, 100);
        let first_id = first.id();
        f.painter.insert_layer(3, Box::new(first));
        f.painter.insert_layer(3, Box::new(second));
        assert_eq!(f.painter.layer(3).unwrap().surface().id(), first_id);
        assert!(!f.painter.layer(3).unwrap().is_builtin());
    }

    #[test]
    fn test_hover_mirror_paints_override_style_on_overlay() {
        let mut f = fixture(100, 100);
        let id = rect_root(&mut f);
        let highlight = Style::filled(Rgba::opaque(255.0, 0.0, 0.0));
        f.painter.add_hover(id, highlight.clone());
        f.painter.add_hover(id, highlight); // deduplicated
        assert_eq!(f.painter.hover_count(), 1);

        f.painter.refresh(&mut f.storage, false);
        let overlay = layer_surface(&f, HOVER_ZLEVEL);
        assert_eq!(fills(&overlay), 1);

        f.painter.remove_hover(id);
        f.painter.refresh(&mut f.storage, false);
        assert_eq!(fills(&layer_surface(&f, HOVER_ZLEVEL)), 0);
    }

    #[test]
    fn test_hover_mirror_pruned_when_source_detached() {
        let mut f = fixture(100, 100);
        let id = rect_root(&mut f);
        f.painter.add_hover(id, Style::default());
        f.painter.refresh(&mut f.storage, false);
        assert_eq!(f.painter.hover_count(), 1);

        f.storage.remove_root(id);
        f.painter.refresh(&mut f.storage, false);
        assert_eq!(f.painter.hover_count(), 0);
    }

    #[test]
    fn test_resize_scales_layers_and_forces_repaint() {
        let mut f = fixture(100, 100);
        rect_root(&mut f);
        f.painter.refresh(&mut f.storage, false);
        f.painter.resize(&mut f.storage, 200, 150);

        let surface = layer_surface(&f, 0);
        assert_eq!((surface.width(), surface.height()), (200, 150));
        assert_eq!(fills(&surface), 1);

        // Same size again: nothing happens.
        let ops_before = surface.ops().len();
        f.painter.resize(&mut f.storage, 200, 150);
        assert_eq!(surface.ops().len(), ops_before);
    }

    #[test]
    fn test_dispose_is_terminal() {
        let mut f = fixture(100, 100);
        rect_root(&mut f);
        f.painter.refresh(&mut f.storage, false);
        f.painter.dispose();
        assert!(f.painter.is_disposed());
        assert_eq!(f.painter.layer_count(), 0);
        // All further calls degrade to logged no-ops.
        f.painter.refresh(&mut f.storage, false);
        f.painter.resize(&mut f.storage, 10, 10);
        assert_eq!(f.painter.layer_count(), 0);
    }

    #[test]
    fn test_render_to_single_surface_composites_in_order() {
        let mut f = fixture(100, 100);
        let low = rect_root(&mut f);
        let high = rect_root(&mut f);
        f.storage.get_mut(high).unwrap().set_zlevel(2);
        let external = RecordingSurface::new(100, 100);
        let external_id = external.id();
        f.painter.insert_layer(1, Box::new(external));

        let composite = f
            .painter
            .render_to_single_surface(&mut f.storage, SingleSurfaceOptions::default())
            .unwrap();
        let handle = f.factory.surface(composite.id()).unwrap();
        let ops = handle.ops();

        let fill_positions: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, SurfaceOp::FillPath { .. }))
            .map(|(i, _)| i)
            .collect();
        let blit_position = ops
            .iter()
            .position(|op| matches!(op, SurfaceOp::DrawSurface { source, .. } if *source == external_id))
            .unwrap();
        assert_eq!(fill_positions.len(), 2);
        // zlevel 0 fill, then the external layer at 1, then zlevel 2.
        assert!(fill_positions[0] < blit_position);
        assert!(blit_position < fill_positions[1]);
        let _ = (low, high);
    }

    #[test]
    fn test_layer_clear_color_configuration() {
        let mut f = fixture(100, 100);
        rect_root(&mut f);
        let color = Rgba::opaque(0.0, 0.0, 255.0).to_premul();
        f.painter.configure_layer(0, LayerConfig {
            clear_color: Some(color),
        });
        f.painter.refresh(&mut f.storage, false);
        let surface = layer_surface(&f, 0);
        assert_eq!(
            surface.ops().first(),
            Some(&SurfaceOp::Clear(Some(color)))
        );
    }
}
