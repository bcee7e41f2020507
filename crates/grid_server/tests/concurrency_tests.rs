//! Concurrent walks, queries and resets against one shared graph.

use grid_server::connection::framing::{encode_frame, read_frame, DEFAULT_MAX_FRAME_LEN};
use grid_server::messaging::{GridService, Location, OneToAll, OneToOne, Walk};
use grid_server::{GridServer, Point, Request, Response, ServerConfig};
use rand::Rng;
use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const SEGMENT_LENGTH: u64 = 7;

/// Fixed routes far enough apart that no point snaps onto another route.
fn route(index: u32) -> Vec<Location> {
    let y = index * 10_000;
    (0..6).map(|step| Location { x: step * 3_000, y }).collect()
}

#[test]
fn test_walks_and_queries_never_observe_partial_state() {
    let service = Arc::new(GridService::new());
    let walkers = 4;
    let walks_per_walker = 200;
    let readers = 4;
    let barrier = Arc::new(Barrier::new(walkers + readers));
    let done = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::new();
    for walker in 0..walkers {
        let service = service.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let locations = route(walker as u32);
            let lengths = vec![SEGMENT_LENGTH; locations.len() - 1];
            let walk = Walk { locations, lengths };
            barrier.wait();
            for _ in 0..walks_per_walker {
                service.apply_walk(&walk);
            }
        }));
    }

    let mut readers_handles = Vec::new();
    for _ in 0..readers {
        let service = service.clone();
        let barrier = barrier.clone();
        let done = done.clone();
        readers_handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            barrier.wait();
            let mut queries = 0u64;
            while !done.load(Ordering::Acquire) {
                let route_index = rng.gen_range(0..walkers as u32);
                let points = route(route_index);
                let hops = rng.gen_range(1..points.len());
                let origin = Point::from(points[0]);
                let destination = Point::from(points[hops]);

                let distance = service.shortest_distance(origin, destination);
                // Either the route is not there yet (the search ends early at
                // distance 0 or a prefix sum), or every edge averages exactly
                // SEGMENT_LENGTH.
                if distance > 0 {
                    assert_eq!(distance % SEGMENT_LENGTH, 0, "torn edge weight observed");
                }
                queries += 1;
            }
            queries
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    done.store(true, Ordering::Release);
    for handle in readers_handles {
        assert!(handle.join().unwrap() > 0);
    }

    // Every edge saw exactly `walks_per_walker` samples of the same length.
    service.with_graph(|graph| {
        let mut edges = 0;
        for cell in graph.cells() {
            for edge in cell.edges().values() {
                assert_eq!(edge.samples, walks_per_walker);
                assert_eq!(edge.sum, walks_per_walker * SEGMENT_LENGTH);
                edges += 1;
            }
        }
        assert_eq!(edges, walkers * 5);
    });

    for walker in 0..walkers as u32 {
        let points = route(walker);
        let distance = service.shortest_distance(
            Point::from(points[0]),
            Point::from(points[points.len() - 1]),
        );
        assert_eq!(distance, 5 * SEGMENT_LENGTH);
    }
}

#[test]
fn test_resets_interleaved_with_walks() {
    let service = Arc::new(GridService::new());
    let stop = Arc::new(AtomicBool::new(false));

    let resetter = {
        let service = service.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                service.reset();
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    let walk = Walk {
        locations: route(0),
        lengths: vec![SEGMENT_LENGTH; 5],
    };
    for _ in 0..500 {
        service.apply_walk(&walk);
        // A walk is applied atomically: the graph holds all six cells of the
        // route or none of them.
        let cells = service.with_graph(|graph| graph.len());
        assert!(cells == 0 || cells == 6, "observed {cells} cells");
        let total = service.total_distance(Point::from(route(0)[0]));
        assert!(total <= 15 * SEGMENT_LENGTH);
    }

    stop.store(true, Ordering::Release);
    resetter.join().unwrap();
}

#[test]
fn test_many_clients_over_tcp() {
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        reactor_threads: 2,
        worker_threads: 4,
        poll_timeout_ms: 10,
        ..ServerConfig::default()
    };
    let server = GridServer::bind(config).unwrap();
    server.start().unwrap();
    let addr = server.local_addr();

    let clients = 8;
    let rounds = 25;
    let handles: Vec<_> = (0..clients)
        .map(|client| {
            thread::spawn(move || {
                let mut stream = TcpStream::connect(addr).unwrap();
                stream
                    .set_read_timeout(Some(Duration::from_secs(10)))
                    .unwrap();
                let points = route(client);

                for _ in 0..rounds {
                    let walk = Request::Walk(Walk {
                        locations: points.clone(),
                        lengths: vec![SEGMENT_LENGTH; points.len() - 1],
                    });
                    assert_eq!(exchange(&mut stream, &walk), Response::ok());

                    let query = Request::OneToOne(OneToOne {
                        origin: points[0],
                        destination: points[points.len() - 1],
                    });
                    assert_eq!(
                        exchange(&mut stream, &query),
                        Response::shortest_path(5 * SEGMENT_LENGTH)
                    );
                }

                let last = Request::OneToAll(OneToAll { origin: points[0] });
                // 7 + 14 + 21 + 28 + 35 along the route.
                assert_eq!(exchange(&mut stream, &last), Response::total(105));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = server.stats();
    assert_eq!(stats.walks, u64::from(clients) * rounds);
    assert_eq!(stats.one_to_one, u64::from(clients) * rounds);
    assert_eq!(stats.one_to_all, u64::from(clients));
    server.shutdown().unwrap();
}

fn exchange(stream: &mut TcpStream, request: &Request) -> Response {
    let frame = encode_frame(&request.encode().unwrap()).unwrap();
    stream.write_all(&frame).unwrap();
    let payload = read_frame(stream, DEFAULT_MAX_FRAME_LEN)
        .unwrap()
        .expect("connection closed early");
    Response::decode(&payload).unwrap()
}
