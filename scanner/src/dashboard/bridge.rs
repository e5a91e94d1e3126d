use crate::dashboard::model::WaterfallView;
use crate::workflow::config::DashboardConfig;
use anyhow::Context;
use log::{debug, info};
use quick_xml::escape::escape;
use rfspikecore::pipeline::FrameObserver;
use rfspikecore::processing::WaterfallSnapshot;
use rfspikecore::Detection;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tokio::runtime::Handle;
use warp::Filter;

#[derive(Default)]
struct DashboardState {
    waterfall: Option<Arc<WaterfallSnapshot>>,
    latest_detection: Option<Detection>,
    frames: u64,
    detections: u64,
}

/// Receives every published waterfall from the pipeline and serves it over
/// HTTP. Holds only shared snapshots, never the live buffer.
#[derive(Clone, Default)]
pub struct DashboardBridge {
    state: Arc<RwLock<DashboardState>>,
}

impl DashboardBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> WaterfallView {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut view = state
            .waterfall
            .as_deref()
            .map(WaterfallView::from_snapshot)
            .unwrap_or_default();
        view.latest_detection = state.latest_detection.clone();
        view.frames = state.frames;
        view.detections = state.detections;
        view
    }

    pub fn routes(
        &self,
        detections_dir: PathBuf,
        max_snapshots: usize,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone + Send + Sync + 'static
    {
        let listing_dir = Arc::new(detections_dir.clone());
        let index = warp::path::end().and(warp::get()).map(move || {
            let files = latest_snapshots(&listing_dir, max_snapshots).unwrap_or_else(|err| {
                debug!("cannot list {}: {}", listing_dir.display(), err);
                Vec::new()
            });
            warp::reply::html(render_index(&files))
        });

        let files = warp::path("detections").and(warp::fs::dir(detections_dir));

        let bridge = self.clone();
        let waterfall = warp::path("waterfall")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || warp::reply::json(&bridge.view()));

        index.or(files).or(waterfall)
    }

    /// Binds the dashboard and spawns it onto `runtime`.
    pub fn serve(
        &self,
        runtime: &Handle,
        config: &DashboardConfig,
        detections_dir: &Path,
    ) -> anyhow::Result<SocketAddr> {
        let routes = self.routes(detections_dir.to_path_buf(), config.max_snapshots);
        let _guard = runtime.enter();
        let (addr, server) = warp::serve(routes)
            .try_bind_ephemeral(config.bind)
            .with_context(|| format!("binding dashboard to {}", config.bind))?;
        runtime.spawn(server);
        info!("dashboard listening on http://{}", addr);
        Ok(addr)
    }
}

impl FrameObserver for DashboardBridge {
    fn observe(&self, waterfall: Arc<WaterfallSnapshot>, detection: Option<&Detection>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.waterfall = Some(waterfall);
        state.frames += 1;
        if let Some(detection) = detection {
            state.latest_detection = Some(detection.clone());
            state.detections += 1;
        }
    }
}

/// PNG file names in `dir`, newest first.
pub fn latest_snapshots(dir: &Path, limit: usize) -> std::io::Result<Vec<String>> {
    let mut pngs: Vec<(SystemTime, String)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".png") {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        pngs.push((modified, name));
    }
    pngs.sort_by(|a, b| b.cmp(a));
    Ok(pngs.into_iter().take(limit).map(|(_, name)| name).collect())
}

pub fn render_index(files: &[String]) -> String {
    let mut body = String::from(
        "<!doctype html>\n<title>RF Detection Dashboard</title>\n<h1>Latest RF Snapshots</h1>\n",
    );
    if files.is_empty() {
        body.push_str("<p>No detections yet.</p>\n");
    }
    for file in files {
        let file = escape(file.as_str());
        body.push_str(&format!(
            "<div style=\"margin-bottom:20px;\">\n  <img src=\"/detections/{file}\" width=\"600\"><br>\n  {file}\n</div>\n"
        ));
    }
    body.push_str(
        "<h2><a href=\"/detections/detections_log.csv\" download>Download Detections Log (CSV)</a></h2>\n\
         <p><a href=\"/waterfall\">Latest waterfall (JSON)</a></p>\n\
         <script>setTimeout(() => { location.reload(); }, 5000);</script>\n",
    );
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rfspikecore::processing::{SpectrumRow, WaterfallBuffer};
    use std::fs::File;
    use std::time::Duration;

    fn snapshot(rows: u64) -> Arc<WaterfallSnapshot> {
        let axis: Arc<[f64]> = vec![914.0, 915.0, 916.0].into();
        let mut buffer = WaterfallBuffer::new(4);
        for sequence in 0..rows {
            let row = SpectrumRow::new(
                sequence,
                Utc::now(),
                vec![sequence as f32; 3],
                Arc::clone(&axis),
            )
            .unwrap();
            buffer.push(row);
        }
        Arc::new(buffer.snapshot())
    }

    #[test]
    fn observer_keeps_latest_frame_and_detection() {
        let bridge = DashboardBridge::new();
        assert_eq!(bridge.view(), WaterfallView::default());

        let detection = Detection::new(Utc::now(), 915.0, -3.0, 5, 1);
        bridge.observe(snapshot(2), None);
        bridge.observe(snapshot(6), Some(&detection));

        let view = bridge.view();
        assert_eq!(view.frames, 2);
        assert_eq!(view.detections, 1);
        assert_eq!(view.sequence, Some(5));
        assert_eq!(view.depth, 4);
        assert_eq!(view.rows.first().unwrap(), &vec![2.0; 3]);
        assert_eq!(view.freq_axis_mhz, vec![914.0, 915.0, 916.0]);
        assert_eq!(view.latest_detection, Some(detection));
    }

    #[test]
    fn snapshots_listed_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let base = SystemTime::now() - Duration::from_secs(100);
        for (i, name) in ["event_a.png", "event_b.png", "event_c.png"].iter().enumerate() {
            let file = File::create(dir.path().join(name)).unwrap();
            file.set_modified(base + Duration::from_secs(i as u64 * 10))
                .unwrap();
        }
        File::create(dir.path().join("detections_log.csv")).unwrap();

        let files = latest_snapshots(dir.path(), 2).unwrap();
        assert_eq!(files, vec!["event_c.png", "event_b.png"]);
        let page = render_index(&files);
        assert!(page.contains("<img src=\"/detections/event_c.png\""));
        assert!(!page.contains("event_a.png"));
    }

    #[tokio::test]
    async fn routes_serve_waterfall_and_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("detections_log.csv"), "Timestamp\n").unwrap();
        let bridge = DashboardBridge::new();
        bridge.observe(snapshot(1), None);
        let routes = bridge.routes(dir.path().to_path_buf(), 10);

        let response = warp::test::request().path("/waterfall").reply(&routes).await;
        assert_eq!(response.status(), 200);
        let view: WaterfallView = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(view.frames, 1);
        assert_eq!(view.rows, vec![vec![0.0; 3]]);

        let response = warp::test::request()
            .path("/detections/detections_log.csv")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"Timestamp\n");

        let response = warp::test::request().path("/").reply(&routes).await;
        assert_eq!(response.status(), 200);
        assert!(std::str::from_utf8(response.body())
            .unwrap()
            .contains("No detections yet."));
    }

    #[test]
    fn serve_binds_an_ephemeral_port() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = DashboardConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let addr = DashboardBridge::new()
            .serve(runtime.handle(), &config, dir.path())
            .unwrap();
        assert_ne!(addr.port(), 0);
    }
}
