use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;

use actix_web::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use actix_web::web::{Data, ServiceConfig};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, route};
use regex::Regex;
use tilepack_mbtiles::MbtilesReader;
use tilepack_tile_utils::{TileCoord, TileFormat, decode_gzip, is_gzip};
use tracing::{debug, error};
use tracing_actix_web::TracingLogger;

use crate::{TilepackError, TilepackResult};

pub const LISTEN_ADDRESS_DEFAULT: &str = "0.0.0.0:8080";

/// `/{z}/{x}/{y}` with an optional extension, after any number of prefix segments.
static TILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:.+/)?(\d+)/(\d+)/(\d+)(?:\.[A-Za-z0-9]+)?$")
        .expect("tile path pattern is valid")
});

/// Extracts a valid tile coordinate from a request path.
#[must_use]
pub fn parse_tile_path(path: &str) -> Option<TileCoord> {
    let caps = TILE_PATH.captures(path)?;
    let z = caps[1].parse().ok()?;
    let x = caps[2].parse().ok()?;
    let y = caps[3].parse().ok()?;
    TileCoord::new_checked(z, x, y)
}

fn accepts_gzip(req: &HttpRequest) -> bool {
    req.headers()
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"))
}

#[route("/{path:.*}", method = "GET", method = "HEAD")]
async fn get_tile(req: HttpRequest, reader: Data<MbtilesReader>) -> HttpResponse {
    let Some(tile) = parse_tile_path(req.path()) else {
        return HttpResponse::NotFound().finish();
    };
    let data = match reader.get_tile(tile).await {
        Ok(Some(data)) => data,
        Ok(None) => return HttpResponse::NotFound().finish(),
        Err(e) => {
            error!("Unable to read tile {tile} from {}: {e}", reader.mbtiles());
            return HttpResponse::NotFound().finish();
        }
    };

    if !is_gzip(&data) {
        return tile_response(data);
    }
    if accepts_gzip(&req) {
        let content_type = TileFormat::detect(&data).map_or(OCTET_STREAM, TileFormat::content_type);
        return HttpResponse::Ok()
            .insert_header((CONTENT_TYPE, content_type))
            .insert_header((CONTENT_ENCODING, "gzip"))
            .body(data);
    }
    debug!("Client does not accept gzip, decompressing {tile}");
    match decode_gzip(&data) {
        Ok(decoded) => tile_response(decoded),
        Err(e) => {
            error!("Unable to decompress tile {tile}: {e}");
            HttpResponse::NotFound().finish()
        }
    }
}

const OCTET_STREAM: &str = "application/octet-stream";

fn tile_response(data: Vec<u8>) -> HttpResponse {
    let content_type = TileFormat::detect(&data).map_or(OCTET_STREAM, TileFormat::content_type);
    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, content_type))
        .body(data)
}

pub fn router(cfg: &mut ServiceConfig) {
    cfg.service(get_tile);
}

type Server = Pin<Box<dyn Future<Output = TilepackResult<()>>>>;

/// Create a future for an Actix web server together with the listening address.
pub fn new_server(listen: &str, reader: MbtilesReader) -> TilepackResult<(Server, String)> {
    let factory = move || {
        App::new()
            .app_data(Data::new(reader.clone()))
            .wrap(TracingLogger::default())
            .configure(router)
    };

    let server = HttpServer::new(factory)
        .bind(listen)
        .map_err(|e| TilepackError::Binding(e, listen.to_string()))?
        .shutdown_timeout(0)
        .run();

    let server: Server = Box::pin(async move { Ok(server.await?) });
    Ok((server, listen.to_string()))
}

#[cfg(test)]
mod tests {
    use actix_web::test::{TestRequest, call_service, init_service, read_body};
    use rstest::rstest;
    use tilejson::Bounds;
    use tilepack_mbtiles::{ArchiveMetadata, MbtilesWriter, WriterOptions};
    use tilepack_tile_utils::encode_gzip;

    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n-fake-png";

    #[rstest]
    #[case("/0/0/0", Some((0, 0, 0)))]
    #[case("/3/7/2.png", Some((3, 7, 2)))]
    #[case("/tilezen/vector/v1/512/all/12/2074/1409.mvt", Some((12, 2074, 1409)))]
    #[case("/3/8/2", None)]
    #[case("/31/0/0", None)]
    #[case("/0/0/99999999999", None)]
    #[case("/0/0", None)]
    #[case("/a/b/c", None)]
    #[case("/0/0/0.", None)]
    #[case("/0/0/0/extra", None)]
    fn tile_paths(#[case] path: &str, #[case] expected: Option<(u8, u32, u32)>) {
        let expected = expected.map(|(z, x, y)| TileCoord { z, x, y });
        assert_eq!(parse_tile_path(path), expected);
    }

    async fn test_reader(dir: &tempfile::TempDir) -> MbtilesReader {
        let path = dir.path().join("serve.mbtiles");
        let meta = ArchiveMetadata::new(Bounds::MAX, 0, 1);
        let mut writer = MbtilesWriter::open(&path, meta, WriterOptions::default())
            .await
            .unwrap();
        writer.save(TileCoord { z: 0, x: 0, y: 0 }, PNG).await.unwrap();
        let mvt = encode_gzip(b"vector tile").unwrap();
        writer.save(TileCoord { z: 1, x: 1, y: 0 }, &mvt).await.unwrap();
        writer.close().await.unwrap();
        MbtilesReader::open(&path).await.unwrap()
    }

    macro_rules! create_app {
        ($reader:expr) => {
            init_service(
                App::new()
                    .app_data(Data::new($reader))
                    .configure(router),
            )
            .await
        };
    }

    #[actix_rt::test]
    async fn serves_plain_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app!(test_reader(&dir).await);

        let req = TestRequest::get().uri("/0/0/0.png").to_request();
        let response = call_service(&app, req).await;
        assert!(response.status().is_success());
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/png");
        assert!(response.headers().get(CONTENT_ENCODING).is_none());
        assert_eq!(read_body(response).await, PNG);
    }

    #[actix_rt::test]
    async fn serves_gzip_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app!(test_reader(&dir).await);

        let req = TestRequest::get()
            .uri("/tilezen/vector/v1/512/all/1/1/0.mvt")
            .insert_header((ACCEPT_ENCODING, "gzip, deflate"))
            .to_request();
        let response = call_service(&app, req).await;
        assert!(response.status().is_success());
        let headers = response.headers();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/x-protobuf");
        assert_eq!(headers.get(CONTENT_ENCODING).unwrap(), "gzip");
        let body = read_body(response).await;
        assert_eq!(decode_gzip(&body).unwrap(), b"vector tile");

        let req = TestRequest::get().uri("/1/1/0.mvt").to_request();
        let response = call_service(&app, req).await;
        assert!(response.status().is_success());
        assert!(response.headers().get(CONTENT_ENCODING).is_none());
        assert_eq!(read_body(response).await, &b"vector tile"[..]);
    }

    #[actix_rt::test]
    async fn missing_tiles_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app!(test_reader(&dir).await);

        for path in ["/1/0/0", "/5/99/0", "/favicon.ico", "/"] {
            let req = TestRequest::get().uri(path).to_request();
            let response = call_service(&app, req).await;
            assert_eq!(response.status().as_u16(), 404, "{path}");
        }
    }

    #[actix_rt::test]
    async fn binding_errors_name_the_address() {
        let dir = tempfile::tempdir().unwrap();
        let reader = test_reader(&dir).await;
        let Err(err) = new_server("not an address", reader) else {
            panic!("binding should fail");
        };
        assert!(matches!(err, TilepackError::Binding(_, addr) if addr == "not an address"));
    }
}
